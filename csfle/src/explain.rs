//! Query-plan parsing for `explain` replies.

use std::fmt;

use mongodb::bson::{Bson, Document};

use crate::error::Error;

/// Stage name of an index scan.
pub const IXSCAN: &str = "IXSCAN";
/// Stage name of a full collection scan.
pub const COLLSCAN: &str = "COLLSCAN";

/// The index an `IXSCAN` stage walked.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexScan {
    /// Index name, e.g. `ssn_1`
    pub index_name: Option<String>,
    /// Index key pattern
    pub key_pattern: Option<Document>,
}

/// The winning plan of a query, as chosen by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    winning_plan: Document,
}

impl QueryPlan {
    /// Extracts `queryPlanner.winningPlan` from an `explain` reply.
    ///
    /// # Errors
    ///
    /// Returns `Error::Explain` if the reply has no winning plan.
    pub fn from_explain(reply: &Document) -> Result<Self, Error> {
        let winning_plan = reply
            .get_document("queryPlanner")
            .and_then(|planner| planner.get_document("winningPlan"))
            .map_err(|e| Error::Explain(format!("missing queryPlanner.winningPlan: {e}")))?;
        Ok(Self { winning_plan: winning_plan.clone() })
    }

    /// Returns the raw winning plan.
    #[must_use]
    pub const fn winning_plan(&self) -> &Document {
        &self.winning_plan
    }

    /// Returns stage names from the root of the plan down to its leaves.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        let mut stages = Vec::new();
        collect_stages(&self.winning_plan, &mut stages);
        stages
    }

    /// Whether any stage is an index scan.
    #[must_use]
    pub fn uses_index_scan(&self) -> bool {
        self.stages().contains(&IXSCAN)
    }

    /// Whether any stage scans the whole collection.
    #[must_use]
    pub fn uses_collection_scan(&self) -> bool {
        self.stages().contains(&COLLSCAN)
    }

    /// Returns the first index scan in the plan.
    #[must_use]
    pub fn index_scan(&self) -> Option<IndexScan> {
        find_stage(&self.winning_plan, IXSCAN).map(|stage| IndexScan {
            index_name: stage.get_str("indexName").ok().map(str::to_string),
            key_pattern: stage.get_document("keyPattern").ok().cloned(),
        })
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stages().join(" -> "))?;
        if let Some(scan) = self.index_scan() {
            if let Some(name) = scan.index_name {
                write!(f, " (index {name})")?;
            }
        }
        Ok(())
    }
}

// Older servers nest stages under `inputStage`/`inputStages`; slot-based
// plans wrap them in `queryPlan`. Walking every sub-document covers both.
fn collect_stages<'a>(plan: &'a Document, stages: &mut Vec<&'a str>) {
    if let Ok(stage) = plan.get_str("stage") {
        stages.push(stage);
    }
    for value in plan.values() {
        for child in child_documents(value) {
            collect_stages(child, stages);
        }
    }
}

fn find_stage<'a>(plan: &'a Document, name: &str) -> Option<&'a Document> {
    if plan.get_str("stage").is_ok_and(|stage| stage == name) {
        return Some(plan);
    }
    plan.values().flat_map(child_documents).find_map(|child| find_stage(child, name))
}

fn child_documents(value: &Bson) -> Vec<&Document> {
    match value {
        Bson::Document(doc) => vec![doc],
        Bson::Array(items) => items.iter().filter_map(Bson::as_document).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn ixscan_reply() -> Document {
        doc! {
            "queryPlanner": {
                "namespace": "medicalRecords.patients",
                "winningPlan": {
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "keyPattern": { "ssn": 1 },
                        "indexName": "ssn_1",
                    },
                },
            },
            "ok": 1,
        }
    }

    #[test]
    fn test_index_scan_plan() {
        let plan = QueryPlan::from_explain(&ixscan_reply()).unwrap();

        assert_eq!(plan.stages(), ["FETCH", "IXSCAN"]);
        assert!(plan.uses_index_scan());
        assert!(!plan.uses_collection_scan());

        let scan = plan.index_scan().unwrap();
        assert_eq!(scan.index_name.as_deref(), Some("ssn_1"));
        assert_eq!(scan.key_pattern, Some(doc! { "ssn": 1 }));
        assert_eq!(plan.to_string(), "FETCH -> IXSCAN (index ssn_1)");
    }

    #[test]
    fn test_collection_scan_plan() {
        let reply = doc! {
            "queryPlanner": { "winningPlan": { "stage": "COLLSCAN", "direction": "forward" } },
        };
        let plan = QueryPlan::from_explain(&reply).unwrap();

        assert!(plan.uses_collection_scan());
        assert!(plan.index_scan().is_none());
        assert_eq!(plan.to_string(), "COLLSCAN");
    }

    #[test]
    fn test_slot_based_plan() {
        let reply = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "queryPlan": {
                        "stage": "FETCH",
                        "inputStage": { "stage": "IXSCAN", "indexName": "ssn_1" },
                    },
                    "slotBasedPlan": { "slots": "..." },
                },
            },
        };
        let plan = QueryPlan::from_explain(&reply).unwrap();
        assert!(plan.uses_index_scan());
    }

    #[test]
    fn test_or_plan_with_input_stages() {
        let reply = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "OR",
                    "inputStages": [
                        { "stage": "IXSCAN", "indexName": "a_1" },
                        { "stage": "IXSCAN", "indexName": "b_1" },
                    ],
                },
            },
        };
        let plan = QueryPlan::from_explain(&reply).unwrap();
        assert_eq!(plan.stages(), ["OR", "IXSCAN", "IXSCAN"]);
        assert_eq!(plan.index_scan().unwrap().index_name.as_deref(), Some("a_1"));
    }

    #[test]
    fn test_missing_planner() {
        let err = QueryPlan::from_explain(&doc! { "ok": 1 }).unwrap_err();
        assert!(matches!(err, Error::Explain(_)));
    }
}
