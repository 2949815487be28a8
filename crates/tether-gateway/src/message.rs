//! Outbound message preparation
//!
//! Turns a wire [`MessageSpec`] into the shape a platform driver sends:
//! mentions appended to the content, embed fields resolved, inline
//! `data:` URLs decoded into attachments referenced from the embed.

use base64::Engine as _;
use chrono::{DateTime, FixedOffset};
use tracing::warn;

use tether_core::{EmbedFieldSpec, EmbedSpec, MessageSpec};

/// An attachment decoded from inline data, re-uploaded under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedAttachment {
    pub name: String,
    pub data: Vec<u8>,
}

/// A rendered embed. Image-bearing fields hold either the original URL or
/// an `attachment://` reference into [`PreparedMessage::attachments`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedEmbed {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub footer_text: Option<String>,
    pub footer_icon: Option<String>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub author_icon: Option<String>,
    pub fields: Vec<EmbedFieldSpec>,
}

/// Everything a driver needs to send one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedMessage {
    pub content: String,
    pub embed: Option<PreparedEmbed>,
    /// Attachments the platform fetches itself.
    pub attachment_urls: Vec<String>,
    /// Attachments uploaded inline.
    pub attachments: Vec<PreparedAttachment>,
    pub reply_to: Option<String>,
    pub fail_if_reply_target_missing: bool,
    /// Attach the affirm/deny confirmation controls.
    pub confirm_buttons: bool,
}

/// Split a `data:image/...;base64,` URL into subtype and payload.
fn parse_data_url(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix("data:image/")?;
    let (subtype, payload) = rest.split_once(";base64,")?;
    matches!(subtype, "png" | "jpeg" | "jpg" | "gif").then_some((subtype, payload))
}

/// Resolve a URL-or-data-URL field. Inline data is decoded and pushed onto
/// `attachments` under `{stem}.{subtype}`; the returned reference points at
/// it. Undecodable inline data drops the field rather than failing the
/// whole message.
fn resolve_media(
    value: &str,
    stem: &str,
    attachments: &mut Vec<PreparedAttachment>,
) -> Option<String> {
    let Some((subtype, payload)) = parse_data_url(value) else {
        return Some(value.to_string());
    };
    match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(data) => {
            let name = format!("{}.{}", stem, subtype);
            attachments.push(PreparedAttachment {
                name: name.clone(),
                data,
            });
            Some(format!("attachment://{}", name))
        }
        Err(e) => {
            warn!("dropping undecodable inline {} image: {}", stem, e);
            None
        }
    }
}

fn render_embed(spec: &EmbedSpec, attachments: &mut Vec<PreparedAttachment>) -> PreparedEmbed {
    let timestamp = spec.timestamp.as_deref().and_then(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .map_err(|e| warn!("dropping invalid embed timestamp {:?}: {}", raw, e))
            .ok()
    });

    PreparedEmbed {
        title: spec.title.clone(),
        url: spec.url.clone(),
        description: spec.description.clone(),
        color: spec.color,
        timestamp,
        footer_text: spec.footer_text.clone(),
        footer_icon: spec
            .footer_icon_url
            .as_deref()
            .and_then(|v| resolve_media(v, "footer_icon", attachments)),
        image: spec
            .image_url
            .as_deref()
            .and_then(|v| resolve_media(v, "image", attachments)),
        thumbnail: spec
            .thumbnail_url
            .as_deref()
            .and_then(|v| resolve_media(v, "thumbnail", attachments)),
        author_name: spec.author_name.clone(),
        author_url: spec.author_url.clone(),
        author_icon: spec
            .author_icon_url
            .as_deref()
            .and_then(|v| resolve_media(v, "author_icon", attachments)),
        fields: spec
            .fields
            .iter()
            .filter(|f| !f.name.is_empty() && !f.value.is_empty())
            .cloned()
            .collect(),
    }
}

/// Prepare one outbound message from its wire spec.
pub fn prepare(spec: &MessageSpec) -> PreparedMessage {
    let mut attachments = Vec::new();
    let embed = spec.embed.as_ref().map(|e| render_embed(e, &mut attachments));

    // Mentions go at the end of the content as platform mention markup.
    let mut content = spec.content.clone();
    for role in spec.mention_role_ids.iter().filter(|r| !r.is_empty()) {
        content.push_str(&format!(" <@&{}>", role));
    }
    for user in spec.mention_user_ids.iter().filter(|u| !u.is_empty()) {
        content.push_str(&format!(" <@{}>", user));
    }

    let mut attachment_urls = Vec::new();
    for file in &spec.files {
        if let Some(url) = &file.url {
            attachment_urls.push(url.clone());
        } else if let Some(data) = &file.data {
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) => attachments.push(PreparedAttachment {
                    name: file.name.clone().unwrap_or_else(|| "file.dat".to_string()),
                    data: bytes,
                }),
                Err(e) => warn!(
                    "dropping undecodable inline file {:?}: {}",
                    file.name.as_deref().unwrap_or(""),
                    e
                ),
            }
        }
    }

    PreparedMessage {
        content,
        embed,
        attachment_urls,
        attachments,
        reply_to: spec.reply_to.clone(),
        fail_if_reply_target_missing: spec.fail_if_reply_target_missing,
        confirm_buttons: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::FileSpec;

    #[test]
    fn mentions_are_appended_to_content() {
        let spec = MessageSpec {
            content: "release is out".into(),
            mention_role_ids: vec!["r1".into()],
            mention_user_ids: vec!["u1".into(), "u2".into()],
            ..Default::default()
        };
        let prepared = prepare(&spec);
        assert_eq!(prepared.content, "release is out <@&r1> <@u1> <@u2>");
    }

    #[test]
    fn inline_embed_image_becomes_an_attachment_reference() {
        let spec = MessageSpec {
            embed: Some(EmbedSpec {
                image_url: Some("data:image/png;base64,aGVsbG8=".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let prepared = prepare(&spec);
        let embed = prepared.embed.unwrap();
        assert_eq!(embed.image.as_deref(), Some("attachment://image.png"));
        assert_eq!(prepared.attachments.len(), 1);
        assert_eq!(prepared.attachments[0].name, "image.png");
        assert_eq!(prepared.attachments[0].data, b"hello");
    }

    #[test]
    fn undecodable_inline_image_is_dropped_not_fatal() {
        let spec = MessageSpec {
            embed: Some(EmbedSpec {
                thumbnail_url: Some("data:image/png;base64,!!notbase64!!".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let prepared = prepare(&spec);
        assert_eq!(prepared.embed.unwrap().thumbnail, None);
        assert!(prepared.attachments.is_empty());
    }

    #[test]
    fn plain_urls_pass_through_untouched() {
        let spec = MessageSpec {
            embed: Some(EmbedSpec {
                image_url: Some("https://example.com/a.png".into()),
                ..Default::default()
            }),
            files: vec![FileSpec {
                url: Some("https://example.com/b.pdf".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let prepared = prepare(&spec);
        assert_eq!(
            prepared.embed.unwrap().image.as_deref(),
            Some("https://example.com/a.png")
        );
        assert_eq!(prepared.attachment_urls, vec!["https://example.com/b.pdf"]);
    }

    #[test]
    fn inline_file_gets_default_name() {
        let spec = MessageSpec {
            files: vec![FileSpec {
                data: Some("aGk=".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let prepared = prepare(&spec);
        assert_eq!(prepared.attachments[0].name, "file.dat");
        assert_eq!(prepared.attachments[0].data, b"hi");
    }

    #[test]
    fn invalid_embed_timestamp_is_dropped() {
        let spec = MessageSpec {
            embed: Some(EmbedSpec {
                timestamp: Some("not a date".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(prepare(&spec).embed.unwrap().timestamp, None);

        let spec = MessageSpec {
            embed: Some(EmbedSpec {
                timestamp: Some("2026-01-15T10:30:00Z".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(prepare(&spec).embed.unwrap().timestamp.is_some());
    }
}
