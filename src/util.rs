//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values, in order.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Collapse every whitespace run (newlines included) into one space.
pub fn normalize_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the first `max` chars, marking the cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((cut, _)) => format!("{}... [TRUNCATED]", &s[..cut]),
    None => s.to_string(),
  }
}

/// Slice from the first `{` to the last `}` inclusive. Models like to wrap
/// JSON in prose or code fences.
pub fn json_object_slice(raw: &str) -> Option<&str> {
  let start = raw.find('{')?;
  let end = raw.rfind('}')?;
  if end < start {
    return None;
  }
  Some(&raw[start..=end])
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((cut, _)) => format!("{}… ({} bytes total)", &s[..cut], s.len()),
    None => s.to_string(),
  }
}
