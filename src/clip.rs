//! Packing an ordered clip sequence into a single audio reference.

pub const MULTI_PREFIX: &str = "multi:";
const SEPARATOR: char = '|';

/// One ref passes through unchanged; several become `multi:a|b|c`.
pub fn encode_refs<S: AsRef<str>>(refs: &[S]) -> String {
    match refs {
        [] => String::new(),
        [single] => single.as_ref().to_string(),
        many => {
            let joined = many.iter().map(|r| r.as_ref()).collect::<Vec<_>>().join("|");
            format!("{}{}", MULTI_PREFIX, joined)
        }
    }
}

/// Inverse of [`encode_refs`]. Empty segments are dropped.
pub fn decode_refs(encoded: &str) -> Vec<String> {
    match encoded.strip_prefix(MULTI_PREFIX) {
        Some(rest) => rest
            .split(SEPARATOR)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        None if encoded.is_empty() => Vec::new(),
        None => vec![encoded.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ref_is_not_wrapped() {
        assert_eq!(encode_refs(&["https://cdn/a.wav"]), "https://cdn/a.wav");
        assert_eq!(decode_refs("https://cdn/a.wav"), vec!["https://cdn/a.wav"]);
    }

    #[test]
    fn several_refs_keep_their_order() {
        let encoded = encode_refs(&["a.wav", "b.wav", "c.wav"]);
        assert_eq!(encoded, "multi:a.wav|b.wav|c.wav");
        assert_eq!(decode_refs(&encoded), vec!["a.wav", "b.wav", "c.wav"]);
    }

    #[test]
    fn decode_tolerates_empty_segments() {
        assert_eq!(decode_refs("multi:a||b|"), vec!["a", "b"]);
        assert!(decode_refs("").is_empty());
        assert!(decode_refs("multi:").is_empty());
    }
}
