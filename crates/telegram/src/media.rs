use dropferry_transfer::{MediaKind, ObjectRef};

use crate::types::Message;

/// Maps a media message to the object to transfer.
///
/// Documents win over other media in the same message. For photos the last
/// (largest) size is used. Returns `None` for messages without media.
pub fn object_ref(message: &Message) -> Option<ObjectRef> {
    if let Some(doc) = &message.document {
        return Some(ObjectRef {
            file_id: doc.file_id.clone(),
            kind: MediaKind::Document,
            file_name: doc.file_name.clone(),
            file_size: doc.file_size.unwrap_or(0),
        });
    }
    if let Some(photo) = message.photo.as_ref().and_then(|sizes| sizes.last()) {
        return Some(ObjectRef {
            file_id: photo.file_id.clone(),
            kind: MediaKind::Image,
            file_name: None,
            file_size: photo.file_size.unwrap_or(0),
        });
    }
    if let Some(video) = &message.video {
        return Some(ObjectRef {
            file_id: video.file_id.clone(),
            kind: MediaKind::Video,
            file_name: video.file_name.clone(),
            file_size: video.file_size.unwrap_or(0),
        });
    }
    message.audio.as_ref().map(|audio| ObjectRef {
        file_id: audio.file_id.clone(),
        kind: MediaKind::Audio,
        file_name: audio.file_name.clone(),
        file_size: audio.file_size.unwrap_or(0),
    })
}
