//! SSML rendering for speech chunks

use super::SpeechChunk;

/// Escape text for embedding in SSML/HTML markup
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a chunk as an SSML document for `voice`
///
/// Leading silence is pinned to zero so consecutive chunks flow together;
/// the chunk's ending silence becomes an explicit break.
#[must_use]
pub fn render(chunk: &SpeechChunk, voice: &str) -> String {
    let lang = voice_language(voice);
    let voice = escape(voice);
    let text = escape(&chunk.text);
    let pause = if chunk.ending_silence_ms > 0 {
        format!("<break time='{}ms' />", chunk.ending_silence_ms)
    } else {
        String::new()
    };

    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' \
         xmlns:mstts='http://www.w3.org/2001/mstts' xml:lang='{lang}'>\
         <voice name='{voice}'><mstts:leadingsilence-exact value='0'/>{text}{pause}</voice></speak>"
    )
}

/// Language tag of a voice name like `en-US-JennyNeural`
fn voice_language(voice: &str) -> &str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &voice[..second],
        _ => "en-US",
    }
}
