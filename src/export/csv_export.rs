use crate::models::{ClassificationResult, MatchBucket};
use anyhow::Result;
use csv::Writer;

fn write_headers(w: &mut Writer<std::fs::File>) -> Result<()> {
    w.write_record([
        "fmt_id",
        "id_1",
        "id_2",
        "proba_model_1",
        "proba_model_2",
        "proba_model_3",
        "bucket",
    ])?;
    Ok(())
}

fn write_result(w: &mut Writer<std::fs::File>, r: &ClassificationResult) -> Result<()> {
    let bucket = match r.bucket {
        MatchBucket::LikelyPositive => "likely_positive",
        MatchBucket::LikelyNegative => "likely_negative",
    };
    w.write_record([
        r.pair.fmt_key(),
        r.pair.id1().to_string(),
        r.pair.id2().to_string(),
        r.probabilities.first().map(|p| p.to_string()).unwrap_or_default(),
        r.probabilities.get(1).map(|p| p.to_string()).unwrap_or_default(),
        r.probabilities.get(2).map(|p| p.to_string()).unwrap_or_default(),
        bucket.to_string(),
    ])?;
    Ok(())
}

pub fn export_to_csv(results: &[ClassificationResult], path: &str) -> Result<()> {
    let mut w = Writer::from_path(path)?;
    write_headers(&mut w)?;
    for r in results {
        write_result(&mut w, r)?;
    }
    w.flush()?;
    Ok(())
}

/// Incremental writer used as a pipeline result hook.
pub struct CsvStreamWriter {
    writer: Writer<std::fs::File>,
}

impl CsvStreamWriter {
    pub fn create(path: &str) -> Result<Self> {
        let mut writer = Writer::from_path(path)?;
        write_headers(&mut writer)?;
        Ok(Self { writer })
    }
    pub fn write(&mut self, r: &ClassificationResult) -> Result<()> {
        write_result(&mut self.writer, r)
    }
    pub fn flush(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
