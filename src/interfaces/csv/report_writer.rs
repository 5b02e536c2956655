use crate::application::report::TransactionReport;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ProjectRow<'a> {
    project_id: u64,
    project_title: &'a str,
    count: usize,
    amount: Decimal,
    successful: usize,
}

/// Writes the per-project section of a report as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_projects(&mut self, report: &TransactionReport) -> Result<()> {
        for row in &report.by_project {
            self.writer.serialize(ProjectRow {
                project_id: row.project_id,
                project_title: &row.project_title,
                count: row.totals.count,
                amount: row.totals.amount,
                successful: row.totals.successful,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report::{Breakdown, DateRange, ProjectBreakdown, ReportSummary};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[test]
    fn test_writes_header_and_rows() {
        let now = Utc::now();
        let report = TransactionReport {
            period: DateRange::new(now, now).unwrap(),
            status_filter: None,
            summary: ReportSummary {
                total_transactions: 2,
                total_amount: dec!(6000),
                successful_transactions: 1,
                success_rate: dec!(50.00),
                amount_by_currency: BTreeMap::new(),
            },
            by_provider: BTreeMap::new(),
            by_project: vec![ProjectBreakdown {
                project_id: 6,
                project_title: "Chemins croisés".to_string(),
                totals: Breakdown {
                    count: 2,
                    amount: dec!(6000),
                    successful: 1,
                },
            }],
        };

        let mut buffer = Vec::new();
        ReportWriter::new(&mut buffer).write_projects(&report).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "project_id,project_title,count,amount,successful\n6,Chemins croisés,2,6000,1\n"
        );
    }
}
