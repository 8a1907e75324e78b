//! Truth-hit event files.
//!
//! Layout:
//!
//! ```json
//! { "events": [ { "id": 1, "hits": [
//!     { "volume": [0, 0, 1, 0, 0, 1, 0, 2, 1],
//!       "entry": [1.0, 2.0, -0.2], "exit": [1.1, 2.0, 0.2],
//!       "energy_mev": 0.155 } ] } ] }
//! ```
//!
//! Volume identifiers are not checked here; the digitizer skips hits whose
//! identifier is not a tracker wafer.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use tkrdigi_core::{Point3, RawHit};

use crate::{Error, Result};

/// One event of unchecked truth hits.
#[derive(Debug, Clone, PartialEq)]
pub struct HitEvent {
    pub id: u64,
    pub hits: Vec<RawHit>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct JsonEventFile {
    events: Vec<JsonEvent>,
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonEvent {
    id: u64,
    #[serde(default)]
    hits: Vec<JsonHit>,
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonHit {
    volume: Vec<i64>,
    entry: [f64; 3],
    exit: [f64; 3],
    energy_mev: f64,
}

impl From<JsonHit> for RawHit {
    fn from(hit: JsonHit) -> Self {
        Self {
            volume: hit.volume,
            entry: Point3::from(hit.entry),
            exit: Point3::from(hit.exit),
            energy_mev: hit.energy_mev,
        }
    }
}

impl From<&RawHit> for JsonHit {
    fn from(hit: &RawHit) -> Self {
        Self {
            volume: hit.volume.clone(),
            entry: [hit.entry.x, hit.entry.y, hit.entry.z],
            exit: [hit.exit.x, hit.exit.y, hit.exit.z],
            energy_mev: hit.energy_mev,
        }
    }
}

fn into_events(file: JsonEventFile) -> Vec<HitEvent> {
    file.events
        .into_iter()
        .map(|event| HitEvent {
            id: event.id,
            hits: event.hits.into_iter().map(RawHit::from).collect(),
        })
        .collect()
}

/// Reads every event of a hit file.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not a valid event
/// file.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<HitEvent>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(Error::file(path))?;
    let reader = BufReader::new(file);
    let contents: JsonEventFile = serde_json::from_reader(reader)?;
    let events = into_events(contents);
    info!(
        "read {} events ({} hits) from {}",
        events.len(),
        events.iter().map(|e| e.hits.len()).sum::<usize>(),
        path.display()
    );
    Ok(events)
}

/// Parses events from a JSON string.
///
/// # Errors
/// Returns an error for malformed JSON.
pub fn parse_events(json: &str) -> Result<Vec<HitEvent>> {
    let file: JsonEventFile = serde_json::from_str(json)?;
    Ok(into_events(file))
}

/// Writes events as a hit file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_events<P: AsRef<Path>>(events: &[HitEvent], path: P) -> Result<()> {
    let contents = JsonEventFile {
        events: events
            .iter()
            .map(|event| JsonEvent {
                id: event.id,
                hits: event.hits.iter().map(JsonHit::from).collect(),
            })
            .collect(),
    };
    let path = path.as_ref();
    let file = File::create(path).map_err(Error::file(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &contents)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
