//! Request arguments and response payloads of the Dropbox v2 API.

use dropferry_transfer::WriteMode;
use serde::{Deserialize, Serialize};

/// Arguments of `upload_session/start`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StartArg {
    pub close: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StartResult {
    pub session_id: String,
}

/// Position within an upload session.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Cursor<'a> {
    pub session_id: &'a str,
    pub offset: u64,
}

/// Arguments of `upload_session/append_v2`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AppendArg<'a> {
    pub cursor: Cursor<'a>,
    pub close: bool,
}

/// Where and how a file is committed.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Commit<'a> {
    pub path: &'a str,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
    pub strict_conflict: bool,
}

impl<'a> Commit<'a> {
    pub fn new(path: &'a str, mode: WriteMode) -> Self {
        Self {
            path,
            mode,
            autorename: false,
            mute: false,
            strict_conflict: false,
        }
    }
}

/// Arguments of `upload_session/finish`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct FinishArg<'a> {
    pub cursor: Cursor<'a>,
    pub commit: Commit<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<&'a str>,
}

/// Arguments of `files/upload`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UploadArg<'a> {
    #[serde(flatten)]
    pub commit: Commit<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<&'a str>,
}

/// Metadata of a committed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountName {
    #[serde(default)]
    pub display_name: String,
}

/// Result of `users/get_current_account`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: AccountName,
}

/// Serializes `value` for the `Dropbox-API-Arg` header.
///
/// HTTP header values must be ASCII, so every character at or above U+007F
/// is written as a `\uXXXX` escape (surrogate pairs above the BMP).
pub(crate) fn header_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if (c as u32) < 0x7f {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_arg_shape() {
        let arg = FinishArg {
            cursor: Cursor {
                session_id: "sid",
                offset: 8,
            },
            commit: Commit::new("/a.bin", WriteMode::Overwrite),
            content_hash: Some("abc"),
        };
        let value = serde_json::to_value(&arg).unwrap();
        assert_eq!(value["cursor"]["session_id"], "sid");
        assert_eq!(value["cursor"]["offset"], 8);
        assert_eq!(value["commit"]["path"], "/a.bin");
        assert_eq!(value["commit"]["mode"], "overwrite");
        assert_eq!(value["commit"]["autorename"], false);
        assert_eq!(value["content_hash"], "abc");
    }

    #[test]
    fn upload_arg_is_flat() {
        let arg = UploadArg {
            commit: Commit::new("/b.txt", WriteMode::Add),
            content_hash: None,
        };
        let value = serde_json::to_value(&arg).unwrap();
        assert_eq!(value["path"], "/b.txt");
        assert_eq!(value["mode"], "add");
        assert!(value.get("content_hash").is_none());
        assert!(value.get("commit").is_none());
    }

    #[test]
    fn header_json_escapes_non_ascii() {
        let arg = UploadArg {
            commit: Commit::new("/фото.jpg", WriteMode::Overwrite),
            content_hash: None,
        };
        let header = header_json(&arg).unwrap();
        assert!(header.is_ascii());
        assert!(header.contains(r"/\u0444\u043e\u0442\u043e.jpg"));

        let back: serde_json::Value = serde_json::from_str(&header).unwrap();
        assert_eq!(back["path"], "/фото.jpg");
    }

    #[test]
    fn header_json_escapes_astral_as_surrogates() {
        let header = header_json(&"🎬").unwrap();
        assert_eq!(header, r#""\ud83c\udfac""#);
    }

    #[test]
    fn metadata_tolerates_extra_fields() {
        let json = r#"{".tag":"file","name":"a.bin","id":"id:1","path_display":"/a.bin","size":3,"content_hash":"h","rev":"r","is_downloadable":true}"#;
        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.size, Some(3));
        assert_eq!(meta.path_display.as_deref(), Some("/a.bin"));
    }

    #[test]
    fn account_parses() {
        let json = r#"{"account_id":"dbid:x","email":"me@example.com","name":{"display_name":"Me","given_name":"M"}}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.email, "me@example.com");
        assert_eq!(account.name.display_name, "Me");
    }
}
