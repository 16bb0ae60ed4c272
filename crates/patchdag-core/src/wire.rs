//! Newline-delimited JSON envelope transport, used by the reference
//! in-memory store for import and export.

use thiserror::Error;

use crate::patch::{Patch, WireBody};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("envelope encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("corrupt envelope on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialize envelopes, one JSON object per line.
pub fn encode_envelopes<B: WireBody>(patches: &[Patch<B>]) -> Result<String, WireError> {
    let mut out = String::new();
    for patch in patches {
        out.push_str(&serde_json::to_string(patch).map_err(WireError::Encode)?);
        out.push('\n');
    }
    Ok(out)
}

/// Parse an NDJSON envelope log. Blank lines are skipped; a corrupt line is
/// a hard error (this is protocol data, not a user document).
pub fn decode_envelopes<B: WireBody + Default>(text: &str) -> Result<Vec<Patch<B>>, WireError> {
    let mut patches = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let patch =
            serde_json::from_str(line).map_err(|source| WireError::Decode { line: i + 1, source })?;
        patches.push(patch);
    }
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_id::PatchId;

    #[test]
    fn envelopes_round_trip() {
        let a = PatchId::encode(1, "c").unwrap();
        let b = PatchId::encode(2, "c").unwrap();
        let patches: Vec<Patch<Vec<u8>>> = vec![
            Patch::new(a.clone(), vec![1], vec![]),
            Patch::new(b, vec![2], vec![a]),
        ];
        let text = encode_envelopes(&patches).unwrap();
        assert_eq!(text.lines().count(), 2);
        let back: Vec<Patch<Vec<u8>>> = decode_envelopes(&text).unwrap();
        assert_eq!(back, patches);
    }

    #[test]
    fn corrupt_lines_are_fatal() {
        let err = decode_envelopes::<Vec<u8>>("{\"id\": 42}\n").unwrap_err();
        assert!(matches!(err, WireError::Decode { line: 1, .. }));
    }
}
