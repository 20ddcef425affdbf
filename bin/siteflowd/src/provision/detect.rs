use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
  Node,
  Python,
  Wordpress,
  Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
  High,
  Medium,
  Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
  pub detected_type: Template,
  pub confidence: Confidence,
  pub reason: String,
  pub files_checked: Vec<String>,
}

/// Classifies a source tree by presence of well-known markers, checked
/// in a fixed node -> python -> wordpress -> static order so that a
/// tree matching more than one (e.g. a Python app that happens to also
/// contain a `wp-content` directory from a bundled theme) resolves
/// deterministically to the first, most specific match.
pub fn detect(entries: &[String]) -> Detection {
  let mut files_checked = Vec::new();

  files_checked.push("package.json".to_string());
  if entries.iter().any(|e| e == "package.json") {
    return Detection {
      detected_type: Template::Node,
      confidence: Confidence::High,
      reason: "found package.json".to_string(),
      files_checked,
    };
  }

  for marker in ["requirements.txt", "pyproject.toml", "manage.py"] {
    files_checked.push(marker.to_string());
    if entries.iter().any(|e| e == marker) {
      return Detection {
        detected_type: Template::Python,
        confidence: Confidence::High,
        reason: format!("found {marker}"),
        files_checked,
      };
    }
  }

  files_checked.push("wp-config.php".to_string());
  if entries.iter().any(|e| e == "wp-config.php") {
    return Detection {
      detected_type: Template::Wordpress,
      confidence: Confidence::High,
      reason: "found wp-config.php".to_string(),
      files_checked,
    };
  }
  files_checked.push("wp-content/".to_string());
  if entries.iter().any(|e| e.contains("wp-content/")) {
    return Detection {
      detected_type: Template::Wordpress,
      confidence: Confidence::Medium,
      reason: "found a wp-content/ path segment".to_string(),
      files_checked,
    };
  }

  Detection {
    detected_type: Template::Static,
    confidence: Confidence::Low,
    reason: "no recognized markers, defaulting to static".to_string(),
    files_checked,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn node_wins_on_canonical_marker() {
    let d = detect(&["package.json".into(), "wp-config.php".into()]);
    assert_eq!(d.detected_type, Template::Node);
    assert_eq!(d.confidence, Confidence::High);
  }

  #[test]
  fn wordpress_weak_marker_is_medium_confidence() {
    let d = detect(&["wp-content/themes/x.php".into()]);
    assert_eq!(d.detected_type, Template::Wordpress);
    assert_eq!(d.confidence, Confidence::Medium);
  }

  #[test]
  fn defaults_to_static() {
    let d = detect(&["index.html".into()]);
    assert_eq!(d.detected_type, Template::Static);
    assert_eq!(d.confidence, Confidence::Low);
  }
}
