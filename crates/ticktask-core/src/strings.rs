//! String utilities — prefix/suffix tests, path components, splitting.
//!
//! Path helpers treat both `/` and `\` as separators so Windows-style and
//! Unix-style paths split the same way regardless of the host platform.

const SEPARATORS: [char; 2] = ['/', '\\'];

/// True if `s` begins with `prefix`. An empty prefix always matches.
pub fn starts_with(s: &str, prefix: &str) -> bool {
    s.starts_with(prefix)
}

/// True if `s` ends with `suffix`. An empty suffix always matches.
pub fn ends_with(s: &str, suffix: &str) -> bool {
    s.ends_with(suffix)
}

/// Directory part: everything before the last separator, empty if there is none.
pub fn file_path(path: &str) -> &str {
    match path.rfind(SEPARATORS) {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// File name including extension: everything after the last separator.
pub fn file_name_ext(path: &str) -> &str {
    match path.rfind(SEPARATORS) {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// File name with the extension stripped.
pub fn file_name(path: &str) -> &str {
    let name = file_name_ext(path);
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Extension including the leading dot, empty if the file name has none.
pub fn extension(path: &str) -> &str {
    let name = file_name_ext(path);
    match name.rfind('.') {
        Some(pos) => &name[pos..],
        None => "",
    }
}

/// Split on a literal separator, keeping empty fields.
///
/// An empty input yields one empty field; an empty separator yields the
/// input unchanged as a single field.
pub fn split_string(s: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![s.to_string()];
    }
    s.split(separator).map(str::to_string).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Between fields (start of input or just after a delimiter).
    Between,
    /// Inside a field that started at the recorded offset.
    InField(usize),
}

/// Split on a single delimiter character, dropping empty fields.
///
/// Consecutive, leading and trailing delimiters produce no fields, and an
/// empty input produces none at all.
pub fn split_string_fsm(s: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut state = ScanState::Between;

    for (pos, ch) in s.char_indices() {
        state = match (state, ch == delimiter) {
            (ScanState::Between, true) => ScanState::Between,
            (ScanState::Between, false) => ScanState::InField(pos),
            (ScanState::InField(start), true) => {
                fields.push(s[start..pos].to_string());
                ScanState::Between
            }
            (in_field @ ScanState::InField(_), false) => in_field,
        };
    }

    if let ScanState::InField(start) = state {
        fields.push(s[start..].to_string());
    }
    fields
}
