use crate::error::ExportError;
use crate::highlight::HighlightMarker;
use crate::models::MatchRecord;
use std::io::Write;
use std::path::Path;

pub const EXPORT_HEADER: [&str; 4] = ["file", "location", "text", "score"];

/// Writes one row per record with highlight markup removed from the text.
pub fn write_csv<W: Write>(
    writer: W,
    records: &[MatchRecord],
    marker: &HighlightMarker,
) -> Result<W, ExportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(EXPORT_HEADER)?;

    for record in records {
        csv.write_record([
            record.filename.clone(),
            record.location.to_string(),
            marker.strip(&record.highlighted_text),
            format!("{:.4}", record.score),
        ])?;
    }

    csv.flush()?;
    csv.into_inner()
        .map_err(|error| ExportError::Io(error.into_error()))
}

pub fn export_csv(records: &[MatchRecord], marker: &HighlightMarker) -> Result<Vec<u8>, ExportError> {
    write_csv(Vec::new(), records, marker)
}

pub fn export_csv_file(
    path: &Path,
    records: &[MatchRecord],
    marker: &HighlightMarker,
) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_csv(file, records, marker)?;
    Ok(())
}
