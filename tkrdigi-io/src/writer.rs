//! Digi output writers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tkrdigi_core::{DigitizedStrip, PlaneDigiMap};

use crate::{Error, Result};

/// CSV column header.
pub const CSV_HEADER: &str =
    "event,tower,layer,view,strip,tot_start,tot_stop,energy_mev,charge_fc,n_hits,gated_out";

/// Output file format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One row per strip.
    #[default]
    Csv,
    /// One JSON document per event, one per line.
    JsonLines,
}

#[derive(Serialize)]
struct JsonDigiEvent<'a> {
    event: u64,
    planes: Vec<JsonPlane<'a>>,
}

#[derive(Serialize)]
struct JsonPlane<'a> {
    tower: u16,
    layer: u16,
    view: String,
    strips: &'a [DigitizedStrip],
}

/// Writer for digitized events.
pub struct DigiWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    events_written: usize,
    strips_written: usize,
}

impl DigiWriter {
    /// Creates the output file. CSV output starts with the header row.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(Error::file(path))?;
        let mut writer = BufWriter::new(file);
        if format == OutputFormat::Csv {
            writeln!(writer, "{CSV_HEADER}")?;
        }
        Ok(Self {
            writer,
            format,
            events_written: 0,
            strips_written: 0,
        })
    }

    /// Appends one event.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_event(&mut self, event_id: u64, digis: &PlaneDigiMap) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(event_id, digis)?,
            OutputFormat::JsonLines => self.write_json(event_id, digis)?,
        }
        self.events_written += 1;
        self.strips_written += digis.strip_count();
        Ok(())
    }

    fn write_csv(&mut self, event_id: u64, digis: &PlaneDigiMap) -> Result<()> {
        for (plane, strips) in digis {
            for s in strips {
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{},{},{},{},{},{}",
                    event_id,
                    plane.tower,
                    plane.layer,
                    plane.view,
                    s.strip,
                    s.tot_start,
                    s.tot_stop,
                    s.energy_mev,
                    s.charge_fc,
                    s.hits.len(),
                    u8::from(s.gated_out)
                )?;
            }
        }
        Ok(())
    }

    fn write_json(&mut self, event_id: u64, digis: &PlaneDigiMap) -> Result<()> {
        let event = JsonDigiEvent {
            event: event_id,
            planes: digis
                .iter()
                .map(|(plane, strips)| JsonPlane {
                    tower: plane.tower,
                    layer: plane.layer,
                    view: plane.view.to_string(),
                    strips,
                })
                .collect(),
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        writeln!(self.writer)?;
        Ok(())
    }

    #[must_use]
    pub fn events_written(&self) -> usize {
        self.events_written
    }

    #[must_use]
    pub fn strips_written(&self) -> usize {
        self.strips_written
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tkrdigi_core::{HitRef, PlaneId, View};

    fn sample() -> PlaneDigiMap {
        let mut digis = PlaneDigiMap::new();
        digis.insert(
            PlaneId::new(1, 4, View::Y),
            DigitizedStrip::new(512, 0.25)
                .with_times(256, 1258)
                .with_charge(11.0)
                .with_hits(vec![HitRef(0), HitRef(3)]),
        );
        digis.insert(
            PlaneId::new(0, 2, View::X),
            DigitizedStrip::new(7, 0.5).with_gated_out(true),
        );
        digis
    }

    #[test]
    fn test_write_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DigiWriter::create(file.path(), OutputFormat::Csv).unwrap();
        writer.write_event(42, &sample()).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.strips_written(), 2);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        // Planes come out in plane order
        assert_eq!(lines[1], "42,0,2,X,7,-1,-1,0.5,0,0,1");
        assert_eq!(lines[2], "42,1,4,Y,512,256,1258,0.25,11,2,0");
    }

    #[test]
    fn test_create_failure_names_path() {
        let result = DigiWriter::create("/tmp/no_such_dir/digis.csv", OutputFormat::Csv);
        let err = result.err().unwrap();
        assert!(matches!(err, Error::File { .. }));
        assert!(err.to_string().contains("/tmp/no_such_dir/digis.csv"));
    }

    #[test]
    fn test_write_json_lines() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DigiWriter::create(file.path(), OutputFormat::JsonLines).unwrap();
        writer.write_event(1, &sample()).unwrap();
        writer.write_event(2, &PlaneDigiMap::new()).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.events_written(), 2);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], 1);
        assert_eq!(first["planes"][1]["strips"][0]["strip"], 512);
        assert_eq!(first["planes"][1]["strips"][0]["hits"][1], 3);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["planes"].as_array().unwrap().is_empty());
    }
}
