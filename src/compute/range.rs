//! Compact 1-based attribute range strings such as `1,3-5,last`.

/// Errors parsing a range string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Invalid range token '{0}'")]
    InvalidToken(String),
    #[error("Index {index} outside 1..={count}")]
    OutOfBounds { index: usize, count: usize },
    #[error("Range '{0}' has start after end")]
    Reversed(String),
}

/// Encode zero-based indices as a 1-based range string.
///
/// Contiguous runs become `start-end`, single indices stay bare, and the
/// parts are comma separated. Duplicates are ignored; an empty input gives an
/// empty string.
pub fn encode_ranges(indices: &[usize]) -> String {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(format!("{}", start + 1));
        } else {
            parts.push(format!("{}-{}", start + 1, end + 1));
        }
    }
    parts.join(",")
}

fn parse_index(token: &str, count: usize) -> Result<usize, RangeError> {
    let index = match token {
        "first" => 1,
        "last" => count,
        t => t
            .parse::<usize>()
            .map_err(|_| RangeError::InvalidToken(t.to_string()))?,
    };
    if index == 0 || index > count {
        return Err(RangeError::OutOfBounds { index, count });
    }
    Ok(index - 1)
}

/// Parse a 1-based range string into sorted, unique zero-based indices.
///
/// `first` and `last` are accepted as aliases for 1 and `count`.
pub fn parse_ranges(spec: &str, count: usize) -> Result<Vec<usize>, RangeError> {
    let mut out = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once('-') {
            Some((a, b)) => {
                let start = parse_index(a.trim(), count)?;
                let end = parse_index(b.trim(), count)?;
                if start > end {
                    return Err(RangeError::Reversed(token.to_string()));
                }
                out.extend(start..=end);
            }
            None => out.push(parse_index(token, count)?),
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}
