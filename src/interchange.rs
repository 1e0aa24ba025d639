use std::fs;
use std::io::{Read, Write};

use camino::Utf8Path;
use serde_json::{Map, Value};

use crate::error::GbifGeoError;
use crate::record::{OCCURRENCE_FIELDS, RawRecord};

pub fn write_records<W: Write>(writer: W, records: &[RawRecord]) -> Result<(), GbifGeoError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(OCCURRENCE_FIELDS)
        .map_err(|err| GbifGeoError::Interchange(err.to_string()))?;
    for record in records {
        let row = OCCURRENCE_FIELDS
            .iter()
            .map(|field| cell_text(record.get(field)))
            .collect::<Vec<_>>();
        csv_writer
            .write_record(&row)
            .map_err(|err| GbifGeoError::Interchange(err.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|err| GbifGeoError::Interchange(err.to_string()))?;
    Ok(())
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>, GbifGeoError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| GbifGeoError::Interchange(err.to_string()))?
        .clone();

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row.map_err(|err| {
            GbifGeoError::Interchange(format!("row {}: {err}", index + 1))
        })?;
        let mut fields = Map::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            fields.insert(name.to_string(), Value::String(cell.to_string()));
        }
        records.push(RawRecord::from_map(fields));
    }
    Ok(records)
}

pub fn write_file(path: &Utf8Path, records: &[RawRecord]) -> Result<(), GbifGeoError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("gbif-geo-dataset")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
    write_records(temp.as_file_mut(), records)?;
    temp.as_file()
        .sync_all()
        .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
    tracing::info!(path = %path, rows = records.len(), "wrote occurrence interchange file");
    Ok(())
}

pub fn read_file(path: &Utf8Path) -> Result<Vec<RawRecord>, GbifGeoError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| GbifGeoError::Interchange(format!("open {path}: {err}")))?;
    let records = read_records(file)?;
    tracing::info!(path = %path, rows = records.len(), "read occurrence interchange file");
    Ok(records)
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(nested) => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn header_is_fixed_field_list() {
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("key,datasetKey,publishingOrgKey,"));
        assert!(header.ends_with(",projectId,identificationRemarks"));
    }

    #[test]
    fn nested_values_become_json_text() {
        let record = RawRecord::new()
            .with("key", json!(7))
            .with("media", json!([{"format": "image/jpeg"}]))
            .with("unknownColumn", "dropped");
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[record]).unwrap();

        let records = read_records(buffer.as_slice()).unwrap();
        assert_eq!(records.len(), 1);
        let back = &records[0];
        assert_eq!(back.key(), Some(7));
        assert_eq!(
            back.get_structured("media"),
            Some(json!([{"format": "image/jpeg"}]))
        );
        assert!(back.get("unknownColumn").is_none());
        assert!(back.get("decimalLatitude").is_none());
    }
}
