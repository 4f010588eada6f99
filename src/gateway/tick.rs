use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use chrono::DateTime;

use crate::{engine::Point, errors::Result, utils::parse_or_default};

/// Parses a tick record: `<epoch_seconds> <bid> <bid_size> <ask> <ask_size>`.
///
/// Fields are whitespace separated. Missing or non-numeric fields become `0`, the timestamp is UTC.
pub fn parse_tick(line: &str) -> Point {
    let mut fields = line.split_whitespace();
    let secs: f64 = parse_or_default(fields.next());
    let bid = parse_or_default(fields.next());
    let bid_size = parse_or_default(fields.next());
    let ask = parse_or_default(fields.next());
    let ask_size = parse_or_default(fields.next());

    let micros = if secs.is_finite() { (secs * 1e6).round() as i64 } else { 0 };
    let time = DateTime::from_timestamp_micros(micros).unwrap_or_default();
    Point::quote(time, bid, bid_size, ask, ask_size)
}

/// A raw tick record and the instrument it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub instrument: String,
    pub line: String,
}

impl Record {
    fn timestamp(&self) -> f64 {
        parse_or_default(self.line.split_whitespace().next())
    }
}

/// Producer of raw tick records, in time order.
pub trait TickSource {
    /// Next record, `None` when the source is exhausted.
    fn next_record(&mut self) -> Option<Result<Record>>;
}

/// Wraps any iterator of lines. Blank lines are skipped.
#[derive(Debug)]
pub struct LineSource<I> {
    instrument: String,
    lines: I,
}

impl<I> LineSource<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    pub fn new(instrument: impl Into<String>, lines: I) -> Self {
        Self {
            instrument: instrument.into(),
            lines,
        }
    }
}

impl<I> TickSource for LineSource<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    fn next_record(&mut self) -> Option<Result<Record>> {
        loop {
            let line: String = self.lines.next()?.into();
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(Record {
                instrument: self.instrument.clone(),
                line,
            }));
        }
    }
}

/// Replays tick records from a text file, one per line.
#[derive(Debug)]
pub struct FileSource {
    instrument: String,
    lines: Lines<BufReader<File>>,
}

impl FileSource {
    /// Opens `path` for `instrument`.
    pub fn open(path: impl AsRef<Path>, instrument: impl Into<String>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            instrument: instrument.into(),
            lines: BufReader::new(file).lines(),
        })
    }
}

impl TickSource for FileSource {
    fn next_record(&mut self) -> Option<Result<Record>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(Record {
                instrument: self.instrument.clone(),
                line,
            }));
        }
    }
}

/// Interleaves several sources by record timestamp. Ties go to the source added first.
#[derive(Default)]
pub struct MergedSource {
    sources: Vec<Box<dyn TickSource + Send>>,
    heads: Vec<Option<Record>>,
    primed: bool,
}

impl MergedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source to the merge.
    pub fn with_source(mut self, source: impl TickSource + Send + 'static) -> Self {
        self.sources.push(Box::new(source));
        self.heads.push(None);
        self.primed = false;
        self
    }

    fn refill(&mut self, index: usize) -> Result<()> {
        self.heads[index] = match self.sources[index].next_record() {
            Some(record) => Some(record?),
            None => None,
        };
        Ok(())
    }
}

impl TickSource for MergedSource {
    fn next_record(&mut self) -> Option<Result<Record>> {
        if !self.primed {
            self.primed = true;
            for index in 0..self.sources.len() {
                if self.heads[index].is_none() {
                    if let Err(e) = self.refill(index) {
                        return Some(Err(e));
                    }
                }
            }
        }

        let mut next: Option<(usize, f64)> = None;
        for (index, head) in self.heads.iter().enumerate() {
            if let Some(record) = head {
                let timestamp = record.timestamp();
                if next.is_none_or(|(_, best)| timestamp < best) {
                    next = Some((index, timestamp));
                }
            }
        }

        let (index, _) = next?;
        let record = self.heads[index].take()?;
        if let Err(e) = self.refill(index) {
            return Some(Err(e));
        }
        Some(Ok(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_tick_record() {
        let point = parse_tick("60 99.5 10 100.5 12");
        assert_eq!(point.time.timestamp(), 60);
        assert_eq!((point.bid, point.bid_size, point.ask, point.ask_size), (99.5, 10.0, 100.5, 12.0));
        assert_eq!(point.price(), 100.0);
    }

    #[test]
    fn bad_fields_default_to_zero() {
        let point = parse_tick("abc 1.0 x");
        assert_eq!(point.time.timestamp(), 0);
        assert_eq!(point.bid, 1.0);
        assert_eq!(point.bid_size, 0.0);
        assert_eq!(point.ask, 0.0);
        assert_eq!(point.ask_size, 0.0);

        let empty = parse_tick("");
        assert_eq!(empty.time.timestamp(), 0);
        assert_eq!(empty.price(), 0.0);
    }

    #[test]
    fn line_source_skips_blank_lines() {
        let mut source = LineSource::new("GOOG", ["0 1 1 2 1", "", "  ", "60 1 1 2 1"].into_iter());
        let first = source.next_record().unwrap().unwrap();
        assert_eq!(first.instrument, "GOOG");
        assert_eq!(first.line, "0 1 1 2 1");
        assert_eq!(source.next_record().unwrap().unwrap().line, "60 1 1 2 1");
        assert!(source.next_record().is_none());
    }

    #[test]
    fn file_source_reads_lines() {
        let path = std::env::temp_dir().join(format!("tickflow-{}.txt", crate::utils::random_id()));
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "0 1 1 2 1").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "30 1 1 2 1").unwrap();
        }
        let mut source = FileSource::open(&path, "GOOG").unwrap();
        let mut count = 0;
        while let Some(record) = source.next_record() {
            record.unwrap();
            count += 1;
        }
        assert_eq!(count, 2);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_error() {
        assert!(FileSource::open("/definitely/not/here.txt", "GOOG").is_err());
    }

    #[test]
    fn merged_source_orders_by_time() {
        let a = LineSource::new("A", ["0 1 1 1 1", "60 1 1 1 1", "120 1 1 1 1"].into_iter());
        let b = LineSource::new("B", ["30 2 1 2 1", "60 2 1 2 1"].into_iter());
        let mut merged = MergedSource::new().with_source(a).with_source(b);

        let mut order = Vec::new();
        while let Some(record) = merged.next_record() {
            let record = record.unwrap();
            let secs = record.timestamp() as i64;
            order.push((record.instrument, secs));
        }
        let expected: Vec<(String, i64)> = vec![
            ("A".into(), 0),
            ("B".into(), 30),
            ("A".into(), 60),
            ("B".into(), 60),
            ("A".into(), 120),
        ];
        assert_eq!(order, expected);
    }
}
