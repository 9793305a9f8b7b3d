use chrono::{DateTime, SecondsFormat, Utc};
use gemini_integration::{ImageConversation, ImageModel, ModelError};
use sha2::{Digest, Sha256};
use shared::domain::{ArtStyle, ComicHash, GeneratedComic, GeneratedPage};
use storage::AssetStore;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::storyboard::{ComicPage, PanelDescription, Storyboard};

const PAGE_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} failed: {source}")]
    Model {
        page: u32,
        #[source]
        source: ModelError,
    },
    #[error("page {page} could not be stored: {source}")]
    Asset {
        page: u32,
        #[source]
        source: anyhow::Error,
    },
}

pub fn art_style_prompt(style: ArtStyle) -> &'static str {
    match style {
        ArtStyle::EpicScifi => {
            "in the style of Moebius/Jean Giraud, epic science fiction illustration, \
             sweeping vistas, dramatic lighting, cosmic scale, detailed linework"
        }
        ArtStyle::NoirThriller => {
            "film noir comic style, high contrast black and white with selective color accents, \
             dramatic shadows, 1940s detective aesthetic, moody atmosphere"
        }
        ArtStyle::RetroComic => {
            "classic 1960s Marvel/DC comic book style, bold outlines, Ben-Day dots, \
             dynamic poses, bright primary colors, action-packed"
        }
        ArtStyle::MinimalXkcd => {
            "simple clean line art, minimalist style, stick figures with expressive poses, \
             clean white background, subtle visual humor"
        }
        ArtStyle::Cyberpunk => {
            "cyberpunk aesthetic, neon colors on dark backgrounds, glitch effects, \
             rain-soaked streets, holographic displays, high-tech low-life atmosphere"
        }
        ArtStyle::PropagandaPoster => {
            "Soviet/WPA propaganda poster style, bold geometric shapes, \
             limited color palette (3-4 colors), stylized heroic figures, strong typography"
        }
    }
}

fn hex12(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..12].to_string()
}

pub fn comic_hash(title: &str, now: DateTime<Utc>) -> ComicHash {
    let seed = format!(
        "{title}:{}",
        now.to_rfc3339_opts(SecondsFormat::Micros, false)
    );
    ComicHash(format!("com_{}", hex12(seed.as_bytes())))
}

pub fn page_asset_path(comic_hash: &ComicHash, page_number: u32, image: &[u8]) -> String {
    format!("pages/{comic_hash}_p{page_number:02}_{}.png", hex12(image))
}

fn panels_text(panels: &[PanelDescription]) -> String {
    panels
        .iter()
        .map(|panel| {
            let mut text = format!("Panel {}: {}", panel.panel_number, panel.scene_description);
            if let Some(caption) = panel.caption.as_deref().filter(|c| !c.is_empty()) {
                text.push_str(&format!("\nCaption: \"{caption}\""));
            }
            if let Some(dialogue) = panel.dialogue.as_deref().filter(|d| !d.is_empty()) {
                text.push_str(&format!("\nDialogue: \"{dialogue}\""));
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Opening prompt for page 1; it fixes the visual language for the whole comic.
pub fn build_initial_prompt(storyboard: &Storyboard) -> String {
    let anchors = &storyboard.visual_anchors;
    let total = storyboard.pages.len();
    let characters = anchors
        .characters
        .iter()
        .map(|character| {
            if character.recurring_props.is_empty() {
                format!("- {}: {}", character.name, character.appearance)
            } else {
                format!(
                    "- {}: {} (props: {})",
                    character.name,
                    character.appearance,
                    character.recurring_props.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let (layout, panel_count, panels) = match storyboard.pages.first() {
        Some(page) => (page.layout.as_str(), page.panels.len(), panels_text(&page.panels)),
        None => ("", 0, String::new()),
    };

    format!(
        "You are creating a {total}-page comic called \"{title}\".

STYLE: {style}
{modifiers}

COLOR PALETTE: {palette}

CHARACTERS (maintain these designs throughout):
{characters}

KEY VISUAL ELEMENTS: {entities}

ATMOSPHERE: {atmosphere}
LINE STYLE: {line_style}

---

Generate PAGE 1 of {total} - THIS IS THE TITLE PAGE.

CRITICAL: This first page must clearly establish what the comic is about.
The title \"{title}\" MUST be prominently displayed as large, readable text.
Include a subtitle like \"A Security Vulnerability Story\" to give context.

Layout: {layout}

{panels}

Requirements:
- Single comic page image with {panel_count} panels
- Clear panel borders
- LARGE, PROMINENT TITLE TEXT that is easy to read
- Professional comic lettering for all text
- 16:9 aspect ratio
- The reader must immediately understand this is a security story about the topic
- Establish the visual style that will continue throughout all pages",
        title = storyboard.title,
        style = art_style_prompt(storyboard.art_style),
        modifiers = storyboard.style_modifiers,
        palette = anchors.color_palette.join(", "),
        entities = anchors.key_entities.join(", "),
        atmosphere = anchors.atmosphere,
        line_style = anchors.line_style,
    )
}

pub fn build_continuation_prompt(storyboard: &Storyboard, page: &ComicPage) -> String {
    format!(
        "Generate PAGE {number} of {total}.
Layout: {layout}

CRITICAL: Maintain EXACT visual consistency with previous pages:
- Same character designs (faces, clothing, proportions)
- Same color palette and saturation
- Same line weight and art style
- Same atmosphere and lighting direction

{panels}

Requirements:
- Single comic page image with {panel_count} panels
- Clear panel borders
- Professional comic lettering for all text
- 16:9 aspect ratio",
        number = page.page_number,
        total = storyboard.pages.len(),
        layout = page.layout,
        panels = panels_text(&page.panels),
        panel_count = page.panels.len(),
    )
}

pub struct ComicRenderer<'a> {
    pub image_model: &'a dyn ImageModel,
    pub assets: &'a dyn AssetStore,
    pub frontend_url: &'a str,
}

impl ComicRenderer<'_> {
    /// Renders every page in order inside one image conversation.
    pub async fn render(&self, storyboard: &Storyboard) -> Result<GeneratedComic, RenderError> {
        let comic_hash = comic_hash(&storyboard.title, Utc::now());
        let total = storyboard.pages.len();
        info!(
            comic_hash = %comic_hash,
            title = %storyboard.title,
            pages = total,
            "comic generation started"
        );

        let mut conversation = ImageConversation::new();
        let mut pages = Vec::with_capacity(total);
        for (index, page) in storyboard.pages.iter().enumerate() {
            let prompt = if index == 0 {
                build_initial_prompt(storyboard)
            } else {
                build_continuation_prompt(storyboard, page)
            };
            let generated = self
                .render_page(&mut conversation, &comic_hash, page.page_number, &prompt)
                .await
                .inspect_err(|err| {
                    error!(page = page.page_number, error = %err, "page generation failed")
                })?;
            info!(page = page.page_number, total, "page generated");
            pages.push(generated);
        }

        let frontend = self.frontend_url.trim_end_matches('/');
        let comic = GeneratedComic {
            share_url: format!("{frontend}/c/{comic_hash}"),
            title: storyboard.title.clone(),
            archetype: storyboard.archetype,
            art_style: storyboard.art_style,
            page_count: total as u32,
            total_panels: storyboard.total_panels(),
            pages,
            generated_at: Utc::now(),
            comic_hash,
        };
        info!(
            comic_hash = %comic.comic_hash,
            pages = comic.pages.len(),
            total_panels = comic.total_panels,
            "comic complete"
        );
        Ok(comic)
    }

    async fn render_page(
        &self,
        conversation: &mut ImageConversation,
        comic_hash: &ComicHash,
        page_number: u32,
        prompt: &str,
    ) -> Result<GeneratedPage, RenderError> {
        debug!(page = page_number, "sending page prompt");
        let image = self
            .image_model
            .send(conversation, prompt)
            .await
            .map_err(|source| RenderError::Model {
                page: page_number,
                source,
            })?;

        let path = page_asset_path(comic_hash, page_number, &image.bytes);
        let image_url = self
            .assets
            .upload(&path, &image.bytes, PAGE_CONTENT_TYPE)
            .await
            .map_err(|source| RenderError::Asset {
                page: page_number,
                source,
            })?;
        debug!(
            page = page_number,
            path = %path,
            size_bytes = image.bytes.len(),
            "page uploaded"
        );

        Ok(GeneratedPage {
            page_number,
            image_url,
        })
    }
}

#[cfg(test)]
#[path = "tests/comic_tests.rs"]
mod tests;
