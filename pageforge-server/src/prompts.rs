//! Prompt and document templates.
//!
//! Everything the pipeline sends to the generator or commits next to the
//! generated page is assembled here, so the wording lives in one place.

use base64::Engine;

use crate::model::Attachment;

/// Shown in the prompt when a request carries no attachments.
pub const NO_ATTACHMENT_NOTE: &str = "(No attachments were provided.)";

/// Longest attachment text inlined into a prompt, in bytes.
const MAX_ATTACHMENT_BYTES: usize = 64 * 1024;

/// Decode a `data:` URI to text.
///
/// Handles both `;base64` and percent-encoded payloads. Returns `None` for
/// anything that is not a data URI or does not decode to UTF-8.
pub fn decode_data_uri(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let bytes = if meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        percent_encoding::percent_decode_str(payload).collect()
    };
    String::from_utf8(bytes).ok()
}

/// Reference material taken from the first attachment.
///
/// Later attachments are ignored. A payload that cannot be decoded is
/// described instead of failing the round.
pub fn attachment_context(attachments: &[Attachment]) -> String {
    let Some(first) = attachments.first() else {
        return NO_ATTACHMENT_NOTE.to_string();
    };
    match decode_data_uri(&first.url) {
        Some(mut text) => {
            if text.len() > MAX_ATTACHMENT_BYTES {
                let mut cut = MAX_ATTACHMENT_BYTES;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str("\n... (truncated)");
            }
            format!("Attachment `{}`:\n{text}", first.name)
        }
        None if first.url.starts_with("data:") => format!(
            "Attachment `{}` could not be decoded as text; do not rely on its contents.",
            first.name
        ),
        None => format!("Attachment `{}` is available at {}", first.name, first.url),
    }
}

/// Round 1 prompt: build the whole app from the brief.
pub fn build_prompt(brief: &str, attachment_context: &str, checks: &[String]) -> String {
    let checks = if checks.is_empty() {
        "- (none given)".to_string()
    } else {
        checks
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are building a single-page web application that will be served \
         from GitHub Pages.\n\n\
         ## Brief\n{brief}\n\n\
         ## Reference material\n{attachment_context}\n\n\
         ## The page will be evaluated against these checks\n{checks}\n\n\
         ## Output\n\
         Return exactly one complete, self-contained HTML document. Put all CSS \
         and JavaScript inline. Do not reference local files; libraries may only \
         be loaded from public CDN URLs. Do not add any explanation before or \
         after the document."
    )
}

/// Round 2 prompt: change the existing page to satisfy a new brief.
pub fn revise_prompt(existing: &str, brief: &str) -> String {
    format!(
        "You are updating an existing single-page web application served from \
         GitHub Pages.\n\n\
         ## Current index.html\n{existing}\n\n\
         ## Requested change\n{brief}\n\n\
         ## Output\n\
         Return the complete updated HTML document. Keep every existing feature \
         working and add the requested one. Keep it self-contained with inline \
         CSS and JavaScript. Do not add any explanation before or after the \
         document."
    )
}

/// README committed next to the page. Embeds the brief verbatim.
pub fn readme(task: &str, brief: &str, pages_url: &str) -> String {
    format!(
        "# {task}\n\n\
         ## Summary\n\n{brief}\n\n\
         ## Live site\n\n{pages_url}\n\n\
         ## Setup\n\n\
         The app is a single static `index.html`. Open it in a browser or serve \
         the repository root with any static file server.\n\n\
         ## Code\n\n\
         All markup, styles and scripts live in `index.html`.\n\n\
         ## License\n\nMIT, see `LICENSE`.\n"
    )
}

/// MIT license text.
pub fn mit_license(holder: &str, year: i32) -> String {
    format!(
        "MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"
    )
}
