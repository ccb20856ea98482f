use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Accepted,
    Rejected,
    Partial,
}

/// What a venue handed back for one order-shaped call, before it is tagged
/// with the requesting strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderAck {
    pub exchange_order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub code: i64,
    pub message: String,
}

impl OrderAck {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Execution report published on the report channel for every order,
/// cancel and amend request the gateway handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub strategy_id: String,
    pub client_order_id: Option<String>,
    pub exchange_order_id: Option<String>,
    pub status: ReportStatus,
    pub error_msg: Option<String>,
    pub ts_request_ms: i64,
    pub ts_report_ms: i64,
}

impl ExecutionReport {
    pub fn accepted(strategy_id: &str, ack: &OrderAck, ts_request_ms: i64, ts_report_ms: i64) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            client_order_id: ack.client_order_id.clone(),
            exchange_order_id: ack.exchange_order_id.clone(),
            status: ReportStatus::Accepted,
            error_msg: None,
            ts_request_ms,
            ts_report_ms,
        }
    }

    pub fn rejected(strategy_id: &str, client_order_id: Option<String>, error_msg: &str, ts_request_ms: i64, ts_report_ms: i64) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            client_order_id,
            exchange_order_id: None,
            status: ReportStatus::Rejected,
            error_msg: Some(error_msg.to_string()),
            ts_request_ms,
            ts_report_ms,
        }
    }
}

/// Report shape for batch calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub strategy_id: String,
    pub status: ReportStatus,
    pub results: Vec<ExecutionReport>,
    pub success_count: usize,
    pub fail_count: usize,
    pub ts_report_ms: i64,
}

impl BatchReport {
    pub fn from_results(strategy_id: &str, results: Vec<ExecutionReport>, ts_report_ms: i64) -> Self {
        let success_count = results.iter().filter(|r| r.status == ReportStatus::Accepted).count();
        let fail_count = results.len() - success_count;
        let status = if fail_count == 0 {
            ReportStatus::Accepted
        } else if success_count == 0 {
            ReportStatus::Rejected
        } else {
            ReportStatus::Partial
        };
        Self {
            strategy_id: strategy_id.to_string(),
            status,
            results,
            success_count,
            fail_count,
            ts_report_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: ReportStatus) -> ExecutionReport {
        ExecutionReport {
            strategy_id: "s1".into(),
            client_order_id: None,
            exchange_order_id: None,
            status,
            error_msg: None,
            ts_request_ms: 0,
            ts_report_ms: 0,
        }
    }

    #[test]
    fn test_batch_report_status() {
        let all_ok = BatchReport::from_results("s1", vec![report(ReportStatus::Accepted); 3], 0);
        assert_eq!(all_ok.status, ReportStatus::Accepted);
        assert_eq!(all_ok.success_count, 3);

        let mixed = BatchReport::from_results(
            "s1",
            vec![report(ReportStatus::Accepted), report(ReportStatus::Rejected)],
            0,
        );
        assert_eq!(mixed.status, ReportStatus::Partial);
        assert_eq!(mixed.fail_count, 1);

        let none = BatchReport::from_results("s1", vec![report(ReportStatus::Rejected)], 0);
        assert_eq!(none.status, ReportStatus::Rejected);
    }
}
