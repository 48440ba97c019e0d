use serde::{Deserialize, Serialize};

use crate::models::RatingDoc;

/// Scoring task sent from the coordinator to one worker. Every worker
/// receives the complete rating list; the shard id selects which rated
/// items it processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecTask {
    pub user_id: i64,
    pub k: usize,
    /// Shard this worker owns (0..shards-1)
    pub shard_id: usize,
    /// Total shard/worker count
    pub shards: usize,
    pub ratings: Vec<RatingDoc>,
}

/// Partial score for one candidate: numerator and denominator are kept
/// separate so the coordinator can sum across shards before dividing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialScore {
    pub movie_id: i64,
    /// sum(sim * rating)
    pub num: f64,
    /// sum(sim)
    pub den: f64,
}

/// One worker's answer to a scoring task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecResponse {
    pub shard_id: usize,
    pub partials: Vec<PartialScore>,
}

/// Maintenance task: recompute and store the neighborhoods of a batch
/// of indexed items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildTask {
    pub i_idxs: Vec<i64>,
    pub metric: String,
    pub k: usize,
    pub min_common_users: usize,
    pub shrink: f64,
}

/// Worker acknowledgement of a rebuild batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildAck {
    pub processed: usize,
}

/// Either message a worker accepts on a fresh connection. The two task
/// shapes carry disjoint required fields, so the untagged decode is
/// unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerRequest {
    Recommend(RecTask),
    Rebuild(RebuildTask),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_names_are_camel_case() {
        let task = RecTask {
            user_id: 7,
            k: 3,
            shard_id: 1,
            shards: 2,
            ratings: vec![RatingDoc {
                user_id: 7,
                movie_id: 10,
                rating: 5.0,
                timestamp: 1700000000,
            }],
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["shardId"], 1);
        assert_eq!(json["ratings"][0]["movieId"], 10);
    }

    #[test]
    fn test_worker_request_decodes_both_shapes() {
        let rec: WorkerRequest = serde_json::from_str(
            r#"{"userId":7,"k":3,"shardId":0,"shards":1,"ratings":[]}"#,
        )
        .unwrap();
        assert!(matches!(rec, WorkerRequest::Recommend(_)));

        let rebuild: WorkerRequest = serde_json::from_str(
            r#"{"iIdxs":[1,2],"metric":"cosine","k":20,"minCommonUsers":5,"shrink":10.0}"#,
        )
        .unwrap();
        assert!(matches!(rebuild, WorkerRequest::Rebuild(_)));
    }

    #[test]
    fn test_partial_score_round_trip() {
        let p = PartialScore {
            movie_id: 100,
            num: 4.0,
            den: 0.8,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"movieId":100,"num":4.0,"den":0.8}"#);
        let back: PartialScore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
