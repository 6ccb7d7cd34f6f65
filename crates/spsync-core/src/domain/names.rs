//! SharePoint-safe names
//!
//! SharePoint and OneDrive reject a set of characters, leading `~`/`$`,
//! trailing dots and spaces, and the legacy device names. Illegal characters
//! are replaced with their fullwidth look-alikes so the remote name stays
//! readable.

/// Longest name SharePoint accepts for a single file or folder.
pub const MAX_NAME_LEN: usize = 255;

/// Installer and bundle extensions that are uploaded through a simple PUT
/// below the raised special-file threshold.
const INSTALLER_EXTENSIONS: &[&str] = &[
    "exe", "msi", "dmg", "pkg", "deb", "rpm", "appimage", "msix",
];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn replacement_for(c: char) -> Option<char> {
    let mapped = match c {
        '#' => '＃',
        '%' => '％',
        '&' => '＆',
        '*' => '＊',
        ':' => '：',
        '<' => '＜',
        '>' => '＞',
        '?' => '？',
        '/' => '／',
        '\\' => '＼',
        '|' => '｜',
        '"' => '＂',
        '{' => '｛',
        '}' => '｝',
        '~' => '～',
        _ => return None,
    };
    Some(mapped)
}

/// Makes a single path segment acceptable to SharePoint.
///
/// For files the reserved-name check applies to the part before the first
/// dot, and truncation keeps the extension. An empty input is returned as is.
pub fn sanitize_name(name: &str, is_folder: bool) -> String {
    if name.is_empty() {
        return String::new();
    }

    let replaced: String = name
        .chars()
        .map(|c| replacement_for(c).unwrap_or(c))
        .collect();

    let mut sanitized = replaced
        .trim_start_matches(['~', '$', '～'])
        .trim_end_matches(['.', ' '])
        .to_string();

    let stem = if is_folder {
        sanitized.as_str()
    } else {
        sanitized.split('.').next().unwrap_or_default()
    };
    if RESERVED_NAMES.contains(&stem.to_ascii_uppercase().as_str()) {
        sanitized.insert(0, '_');
    }

    if sanitized.is_empty() {
        sanitized = "_unnamed".to_string();
    }

    if sanitized.chars().count() > MAX_NAME_LEN {
        sanitized = match name.rsplit_once('.') {
            Some((_, ext)) if !is_folder => {
                let ext: String = ext.chars().map(|c| replacement_for(c).unwrap_or(c)).collect();
                let base_len = MAX_NAME_LEN.saturating_sub(ext.chars().count() + 1);
                let base: String = sanitized.chars().take(base_len).collect();
                format!("{base}.{ext}")
            }
            _ => sanitized.chars().take(MAX_NAME_LEN).collect(),
        };
    }

    sanitized
}

/// Normalizes separators and sanitizes every segment of a relative path.
///
/// Empty segments are dropped. The last segment is treated as a file when it
/// contains a dot and `last_is_file` is set; all other segments are folders.
pub fn sanitize_path(path: &str, last_is_file: bool) -> Vec<String> {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let is_folder = i < last || !last_is_file || !segment.contains('.');
            sanitize_name(segment, is_folder)
        })
        .collect()
}

/// Joins sanitized folder segments back into a `/`-separated path.
pub fn sanitize_folder_path(path: &str) -> String {
    sanitize_path(path, false).join("/")
}

/// Names with several dot-separated segments or an installer extension.
///
/// These upload through a single request up to the raised special threshold.
pub fn is_special_file(name: &str) -> bool {
    if name.matches('.').count() > 1 {
        return true;
    }
    match name.rsplit_once('.') {
        Some((_, ext)) => INSTALLER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Broad file families used to pick the metadata retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFamily {
    /// HTML and other markup SharePoint sanitizes after upload.
    Markup,
    /// PDF and office documents SharePoint indexes after upload.
    Document,
    Image,
    Other,
}

impl FileFamily {
    pub fn of(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" | "xhtml" | "xml" | "svg" | "md" | "aspx" => Self::Markup,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp"
            | "rtf" | "csv" | "txt" => Self::Document,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff" | "ico" => {
                Self::Image
            }
            _ => Self::Other,
        }
    }
}
