//! Small shared helpers.

/// Derive the default output path for a timestamped copy: the suffix
/// goes before the final extension, or at the end when there is none.
/// A leading dot alone (hidden files) does not count as an extension.
pub fn generate_output_filename(path: &str) -> String {
    let split = path.rfind(['/', '\\']).map(|index| index + 1).unwrap_or(0);
    let (dir, file) = path.split_at(split);
    match file.rfind('.') {
        Some(dot) if dot > 0 => {
            format!("{dir}{}-timestamped{}", &file[..dot], &file[dot..])
        }
        _ => format!("{dir}{file}-timestamped"),
    }
}
