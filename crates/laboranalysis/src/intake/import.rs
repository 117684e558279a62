use std::io::Read;

use serde::Serialize;

use super::service::OrderRequest;
use crate::pipeline::OrderId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the source file, header included.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub accepted: Vec<OrderId>,
    pub rejected: Vec<RejectedRow>,
}

impl ImportSummary {
    pub(crate) fn accept(&mut self, order_id: OrderId) {
        self.accepted.push(order_id);
    }

    pub(crate) fn reject(&mut self, line: u64, reason: String) {
        self.rejected.push(RejectedRow { line, reason });
    }
}

/// Rows of a `customer,kind,subject` file paired with their line number.
/// Only an unreadable header fails the whole file.
pub(crate) fn parse_rows<R: Read>(
    reader: R,
) -> Result<Vec<(u64, Result<OrderRequest, csv::Error>)>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut rows = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let fallback = index as u64 + 2;
        match record {
            Ok(record) => {
                let line = record.position().map_or(fallback, |position| position.line());
                rows.push((line, record.deserialize(Some(&headers))));
            }
            Err(err) => rows.push((fallback, Err(err))),
        }
    }
    Ok(rows)
}
