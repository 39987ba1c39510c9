//! CSV trade journal adapter.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::domain::error::DivtraderError;
use crate::domain::order::TradeRecord;
use crate::ports::journal_port::JournalPort;

pub struct CsvJournalAdapter {
    path: PathBuf,
}

impl CsvJournalAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read every journaled row back, oldest first.
    pub fn read_all(&self) -> Result<Vec<TradeRecord>, DivtraderError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        Ok(rows)
    }
}

impl JournalPort for CsvJournalAdapter {
    fn record(&self, entry: &TradeRecord) -> Result<(), DivtraderError> {
        let is_new = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        wtr.serialize(entry)?;
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Venue;
    use crate::domain::order::Side;
    use tempfile::tempdir;

    fn entry(quantity: i64) -> TradeRecord {
        TradeRecord {
            timestamp: "2024-03-04 10:00:00".into(),
            cycle_id: "#20240304100000".into(),
            source: "FORCED_TRADE".into(),
            side: Side::Buy,
            stock_code: "005930".into(),
            quantity,
            price: 0,
            market: Venue::Krx,
            order_ref: "P-1".into(),
        }
    }

    #[test]
    fn writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.csv");
        let journal = CsvJournalAdapter::new(&path);
        journal.record(&entry(25)).unwrap();
        journal.record(&entry(30)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,cycle_id,source,side,stock_code,quantity,price,market,order_ref"
        );
        assert!(lines[1].contains(",BUY,005930,25,0,KRX,"));
    }

    #[test]
    fn read_all_returns_rows_in_order() {
        let dir = tempdir().unwrap();
        let journal = CsvJournalAdapter::new(dir.path().join("journal.csv"));
        journal.record(&entry(25)).unwrap();
        journal.record(&entry(30)).unwrap();
        let rows = journal.read_all().unwrap();
        assert_eq!(rows, vec![entry(25), entry(30)]);
    }

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let journal = CsvJournalAdapter::new(dir.path().join("none.csv"));
        assert!(journal.read_all().unwrap().is_empty());
    }
}
