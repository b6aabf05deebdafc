//! Loading fixture dumps: one JSON-encoded interaction per line.

use crate::error::FixtureError;
use crate::store::FixtureStore;
use crate::types::RecordedRpc;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Parse every interaction from a dump. Blank lines are skipped; `source`
/// only labels errors.
pub fn parse_fixtures<R: BufRead>(reader: R, source: &Path) -> Result<Vec<RecordedRpc>, FixtureError> {
    let mut rpcs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FixtureError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let rpc = serde_json::from_str(line).map_err(|e| FixtureError::Parse {
            path: source.to_path_buf(),
            line: index + 1,
            source: e,
        })?;
        rpcs.push(rpc);
    }
    Ok(rpcs)
}

pub fn load_fixture_file(path: &Path) -> Result<Vec<RecordedRpc>, FixtureError> {
    let file = File::open(path).map_err(|e| FixtureError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let rpcs = parse_fixtures(BufReader::new(file), path)?;
    debug!("Read {} recorded interactions from {}", rpcs.len(), path.display());
    Ok(rpcs)
}

/// Load several dumps into one store. Later files override earlier ones
/// for identical unary requests.
pub fn load_fixture_files<P: AsRef<Path>>(paths: &[P]) -> Result<FixtureStore, FixtureError> {
    let mut rpcs = Vec::new();
    for path in paths {
        rpcs.extend(load_fixture_file(path.as_ref())?);
    }

    let store = FixtureStore::new(rpcs);
    info!(
        "Loaded {} recorded interactions for {} methods ({} replayable as unary)",
        store.interaction_count(),
        store.method_count(),
        store.unary_method_count()
    );
    Ok(store)
}
