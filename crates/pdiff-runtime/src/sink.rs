//! Result sink: discrepancy records -> append-only output stream.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use pdiff_reconcile::Discrepancy;

pub const HEADER_ACCOUNT: &str = "account";
pub const HEADER_KEY: &str = "key";
pub const HEADER_VALUATION: &str = "valuation";

/// Receives discrepancy records as they are produced.
pub trait DiscrepancySink {
    fn write(&mut self, record: &Discrepancy) -> Result<()>;
}

/// In-memory sink.
impl DiscrepancySink for Vec<Discrepancy> {
    fn write(&mut self, record: &Discrepancy) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// CSV sink with a fixed column order:
/// `account,key,<tag A>,<tag B>,valuation`.
///
/// Every record is flushed immediately so partial progress survives a
/// mid-run failure. Values containing the delimiter, quotes, or newlines are
/// quoted per RFC 4180.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    /// Create the sink and write the header line.
    pub fn new(out: W, tag_a: &str, tag_b: &str) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer
            .write_record([HEADER_ACCOUNT, HEADER_KEY, tag_a, tag_b, HEADER_VALUATION])
            .context("write csv header failed")?;
        writer.flush().context("flush csv header failed")?;
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow!("csv sink flush failed: {}", e.error()))
    }
}

impl<W: Write> DiscrepancySink for CsvSink<W> {
    fn write(&mut self, record: &Discrepancy) -> Result<()> {
        let source_a = record.source_a.to_string();
        let source_b = record.source_b.to_string();
        self.writer
            .write_record([
                record.account.as_str(),
                record.key.as_str(),
                source_a.as_str(),
                source_b.as_str(),
                if record.is_valuation { "true" } else { "false" },
            ])
            .with_context(|| format!("write csv record failed: account={}", record.account))?;
        self.writer
            .flush()
            .with_context(|| format!("flush csv record failed: account={}", record.account))?;
        Ok(())
    }
}
