use url::Url;

/// Name under which a downloaded episode is stored on the content host
///
/// Format: "<podcast-id>/<episode-id>.<ext>", both ids sanitized.
pub fn media_object_name(podcast_id: &str, episode_id: &str, url: &str, mime: Option<&str>) -> String {
    format!(
        "{}/{}.{}",
        sanitize_component(podcast_id),
        sanitize_component(episode_id),
        audio_extension(url, mime)
    )
}

/// Get the audio file extension for a media URL
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn audio_extension(url: &str, mime: Option<&str>) -> String {
    if let Some(ext) = Url::parse(url)
        .ok()
        .as_ref()
        .and_then(|url| url.path_segments())
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.').map(|(_, ext)| ext.to_string()))
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(mime) = mime
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

fn sanitize_component(value: &str) -> String {
    let sanitized = sanitize_filename::sanitize(value.trim());
    let sanitized = sanitized.trim_matches('.');
    if sanitized.is_empty() {
        "episode".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
