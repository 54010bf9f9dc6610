//! Line-oriented transform files.
//!
//! ```text
//! #qsmprep transform v1
//! Kind: rigid
//! Parameters: 0.01 0 -0.02 5.25 0 1
//! Center: 12.5 -3 40
//! ```
//!
//! Values are written with the shortest representation that parses back to
//! the same `f64`, so a reloaded transform maps points bit-for-bit the same.

use std::path::Path;

use qsmprep_core::{Point3, Transform, TransformKind};

use crate::error::{require_exists, IoError, Result};

pub const TRANSFORM_HEADER: &str = "#qsmprep transform v1";

/// Serialize a transform to its text form.
pub fn format_transform(transform: &Transform) -> String {
    let join = |values: &[f64]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
    format!(
        "{}\nKind: {}\nParameters: {}\nCenter: {}\n",
        TRANSFORM_HEADER,
        transform.kind(),
        join(transform.parameters()),
        join(transform.center().coords.as_slice())
    )
}

/// Parse the text form written by [`format_transform`]. `origin` names the
/// source in error messages.
pub fn parse_transform(text: &str, origin: &Path) -> Result<Transform> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(TRANSFORM_HEADER) => {}
        other => {
            return Err(IoError::format(
                "transform",
                origin,
                format!("expected header {:?}, found {:?}", TRANSFORM_HEADER, other),
            ))
        }
    }

    let mut kind = None;
    let mut parameters = None;
    let mut center = None;
    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| IoError::format("transform", origin, format!("unexpected line {:?}", line)))?;
        let value = value.trim();
        match key.trim() {
            "Kind" => {
                let k: TransformKind = value
                    .parse()
                    .map_err(|e| IoError::format("transform", origin, format!("{}", e)))?;
                kind = Some(k);
            }
            "Parameters" => parameters = Some(parse_numbers(value, origin)?),
            "Center" => center = Some(parse_numbers(value, origin)?),
            other => {
                return Err(IoError::format("transform", origin, format!("unknown field {:?}", other)));
            }
        }
    }

    let kind = kind.ok_or_else(|| IoError::format("transform", origin, "missing Kind"))?;
    let parameters = parameters.ok_or_else(|| IoError::format("transform", origin, "missing Parameters"))?;
    let center = match center.as_deref() {
        Some([x, y, z]) => Point3::new(*x, *y, *z),
        Some(c) => {
            return Err(IoError::format(
                "transform",
                origin,
                format!("Center needs 3 values, found {}", c.len()),
            ))
        }
        None => return Err(IoError::format("transform", origin, "missing Center")),
    };
    Ok(Transform::from_parameters(kind, &parameters, center)?)
}

fn parse_numbers(value: &str, origin: &Path) -> Result<Vec<f64>> {
    value
        .split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|e| IoError::format("transform", origin, format!("bad number {:?}: {}", t, e)))
        })
        .collect()
}

/// Write a transform file, creating parent directories as needed.
pub fn save_transform<P: AsRef<Path>>(transform: &Transform, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format_transform(transform))?;
    tracing::debug!(path = %path.display(), kind = %transform.kind(), "saved transform");
    Ok(())
}

/// Read a transform file. A missing file is [`IoError::MissingResource`].
pub fn load_transform<P: AsRef<Path>>(path: P) -> Result<Transform> {
    let path = path.as_ref();
    require_exists(path)?;
    let text = std::fs::read_to_string(path)?;
    parse_transform(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsmprep_core::Vector3;

    #[test]
    fn test_text_is_exact() {
        let t = Transform::rigid(
            Vector3::new(0.1, -1.0 / 3.0, 2.0e-9),
            Vector3::new(5.000000000000001, 0.0, -7.25),
            Point3::new(1.0 / 7.0, 0.0, 99.5),
        );
        let text = format_transform(&t);
        assert!(text.starts_with(TRANSFORM_HEADER));
        let back = parse_transform(&text, Path::new("mem")).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_formatted_layout() {
        let t = Transform::rigid(Vector3::zeros(), Vector3::new(5.25, 0.0, 1.0), Point3::new(12.5, -3.0, 40.0));
        assert_eq!(
            format_transform(&t),
            format!("{}\nKind: rigid\nParameters: 0 0 0 5.25 0 1\nCenter: 12.5 -3 40\n", TRANSFORM_HEADER)
        );
    }

    #[test]
    fn test_wrong_parameter_count() {
        let text = format!("{}\nKind: affine\nParameters: 1 0 0\nCenter: 0 0 0\n", TRANSFORM_HEADER);
        assert!(parse_transform(&text, Path::new("mem")).is_err());
    }

    #[test]
    fn test_missing_header() {
        let err = parse_transform("Kind: rigid\n", Path::new("x.tfm")).unwrap_err();
        assert!(matches!(err, IoError::Format { .. }));
    }

    #[test]
    fn test_comments_are_skipped() {
        let text = format!(
            "{}\n# estimated at level 3\nKind: rigid\nParameters: 0 0 0 1 2 3\nCenter: 0 0 0\n",
            TRANSFORM_HEADER
        );
        let t = parse_transform(&text, Path::new("mem")).unwrap();
        assert_eq!(t.translation(), Vector3::new(1.0, 2.0, 3.0));
    }
}
