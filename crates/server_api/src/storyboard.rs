use gemini_integration::{generate_structured, LanguageModel, ModelError, StructuredOutput};
use serde::{Deserialize, Serialize};
use shared::domain::{Archetype, ArtStyle, StoryCard};
use tracing::{error, info};

pub const STORYBOARD_SYSTEM_PROMPT: &str = "\
You are a comic book writer and visual storyteller.
You create compelling visual narratives that educate while entertaining.
You understand comic pacing, visual storytelling, and how to make
technical concepts accessible through imagery.

CRITICAL - PAGE 1 MUST ESTABLISH CONTEXT:
The first page is the TITLE PAGE. It MUST immediately tell the reader:
1. The PACKAGE NAME prominently displayed (e.g., \"LODASH\", \"AXIOS\")
2. A clear TITLE that hints at what happened
3. A SUBTITLE or tagline explaining it's a security vulnerability story
4. The DATE/YEAR of the incident if known
5. Visual elements that preview the story's theme

IMPORTANT RULES:
1. Always create CONCRETE visual descriptions - not abstract concepts
2. Characters must be visually distinctive and consistent
3. Each panel should be a single clear scene
4. Keep captions short (under 15 words)
5. End with a clear educational takeaway
6. PAGE 1 FIRST PANEL must have the package name and title clearly visible as text

ARCHETYPE SELECTION:
- HEIST (4-6 pages): For targeted attacks with clear attacker intent
- OOPS (3-4 pages): For accidental chaos or unintended consequences
- SAGA (6-10 pages): For multi-wave incidents that evolved over time
- LURKER (3-5 pages): For long-hidden vulnerabilities

ART STYLE SELECTION:
- EPIC_SCIFI: Grand scale, cosmic, Moebius-inspired - use for large-scale attacks
- NOIR_THRILLER: Dark, corporate espionage vibes - use for targeted attacks
- RETRO_COMIC: Classic superhero comic style - use for dramatic discoveries
- MINIMAL_XKCD: Simple, witty, stick figures - use for absurd/ironic incidents
- CYBERPUNK: Neon, glitch, hacker aesthetic - use for crypto/DeFi exploits
- PROPAGANDA_POSTER: Bold, protest art style - use for intentional sabotage

VISUAL ANCHORS:
- color_palette: 3-5 specific colors with hex codes
- characters: ALL recurring characters with detailed descriptions
- key_entities: Visual descriptions of important concepts
- atmosphere: Overall mood
- line_style: Drawing style notes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDesign {
    pub name: String,
    pub appearance: String,
    #[serde(default)]
    pub recurring_props: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualAnchors {
    #[serde(default)]
    pub color_palette: Vec<String>,
    #[serde(default)]
    pub characters: Vec<CharacterDesign>,
    #[serde(default)]
    pub key_entities: Vec<String>,
    #[serde(default)]
    pub atmosphere: String,
    #[serde(default)]
    pub line_style: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDescription {
    pub panel_number: u32,
    pub scene_description: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub dialogue: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicPage {
    pub page_number: u32,
    #[serde(default)]
    pub layout: String,
    pub panels: Vec<PanelDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storyboard {
    pub title: String,
    pub archetype: Archetype,
    pub art_style: ArtStyle,
    #[serde(default)]
    pub style_modifiers: String,
    pub visual_anchors: VisualAnchors,
    pub pages: Vec<ComicPage>,
}

impl Storyboard {
    pub fn total_panels(&self) -> u32 {
        self.pages.iter().map(|page| page.panels.len() as u32).sum()
    }
}

impl StructuredOutput for Storyboard {
    const SCHEMA_HINT: &'static str = r#"{
  "title": string,
  "archetype": "HEIST" | "OOPS" | "SAGA" | "LURKER",
  "art_style": "EPIC_SCIFI" | "NOIR_THRILLER" | "RETRO_COMIC" | "MINIMAL_XKCD" | "CYBERPUNK" | "PROPAGANDA_POSTER",
  "style_modifiers": string,
  "visual_anchors": {
    "color_palette": [string],
    "characters": [{ "name": string, "appearance": string, "recurring_props": [string] }],
    "key_entities": [string],
    "atmosphere": string,
    "line_style": string
  },
  "pages": [{
    "page_number": integer,
    "layout": string,
    "panels": [{ "panel_number": integer, "scene_description": string, "caption": string | null, "dialogue": string | null }]
  }]
}"#;
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn storyboard_prompt(card: &StoryCard) -> String {
    let package_upper = card.package_name.to_uppercase();
    let severity = card.severity.map(|s| s.as_str()).unwrap_or("UNKNOWN");
    let incident_line = card
        .incident_date
        .as_deref()
        .map(|date| format!("INCIDENT DATE: {date}"))
        .unwrap_or_default();
    let incident_date = card.incident_date.as_deref().unwrap_or("Unknown");

    format!(
        "Create a comic storyboard for this security incident:

TITLE: {title}
PACKAGE: {package}@{version}
SEVERITY: {severity}
STORY TYPE: {story_type}

WHAT HAPPENED:
{what_happened}

WHY IT MATTERS:
{why}

WHAT TO DO:
{what_to_do}

{incident_line}

---

CRITICAL REQUIREMENT - PAGE 1 MUST BE A CLEAR TITLE PAGE:
The FIRST PAGE, FIRST PANEL must prominently display:
- The package name \"{package_upper}\" in large text
- A dramatic title for this story
- A subtitle like \"A Security Vulnerability Story\" or \"What Went Wrong\"
- The year/date if known: {incident_date}

The reader should know EXACTLY what this comic is about within 2 seconds of seeing page 1.

---

Select the best archetype based on the incident type:
- If it's an active attack/compromise: HEIST or SAGA
- If it's accidental/maintainer action: OOPS
- If it's a long-hidden vulnerability: LURKER

Select an art style that matches the incident tone.

Create detailed visual_anchors for consistency:
- Define 3-5 colors with hex codes
- Describe ALL characters who will appear
- List key visual elements/metaphors
- Set the atmosphere and line style

Then create the page-by-page storyboard:

PAGE 1 (TITLE PAGE):
- Panel 1: MUST be a title card with \"{package_upper}\" prominently displayed, story title, and \"A Security Story\" subtitle
- Remaining panels: Brief setup or preview of the threat

SUBSEQUENT PAGES:
- 2-4 panels per page (prefer fewer, larger panels)
- Clear scene descriptions
- Dialogue and/or captions as needed
- Appropriate layout

Make it educational but engaging. The reader should understand the security issue and remember it.",
        title = card.title,
        package = card.package_name,
        version = card.package_version,
        story_type = card.story_type.as_str(),
        what_happened = bullets(&card.what_happened),
        why = bullets(&card.why_should_i_care),
        what_to_do = bullets(&card.what_should_i_do),
    )
}

pub async fn generate_storyboard(
    model: &dyn LanguageModel,
    card: &StoryCard,
) -> Result<Storyboard, ModelError> {
    info!(story_id = %card.id, title = %card.title, "storyboard generation started");

    let storyboard: Storyboard =
        match generate_structured(model, STORYBOARD_SYSTEM_PROMPT, &storyboard_prompt(card)).await
        {
            Ok(storyboard) => storyboard,
            Err(err) => {
                error!(story_id = %card.id, error = %err, "storyboard generation failed");
                return Err(err);
            }
        };

    if storyboard.pages.is_empty() {
        error!(story_id = %card.id, "storyboard has no pages");
        return Err(ModelError::InvalidOutput("storyboard has no pages".into()));
    }

    info!(
        story_id = %card.id,
        title = %storyboard.title,
        archetype = %storyboard.archetype,
        art_style = %storyboard.art_style,
        pages = storyboard.pages.len(),
        total_panels = storyboard.total_panels(),
        "storyboard generated"
    );
    Ok(storyboard)
}
