//! # Media Detector
//!
//! Pattern-based extraction of anime, TV show, game and YouTube mentions from
//! free-form chat messages. Detection is heuristic: patterns favour recall,
//! and every finding carries a confidence score.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;

/// Distance in bytes around a title searched for a related link.
const URL_SEARCH_RADIUS: usize = 50;

/// Width of the `media_recommendations.title` column.
pub const MAX_TITLE_CHARS: usize = 255;

const STOP_WORDS: [&str; 10] = [
    "the", "a", "an", "and", "or", "but", "is", "was", "are", "were",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Anime,
    TvShow,
    Game,
    YouTube,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Anime => "anime",
            MediaType::TvShow => "tv_show",
            MediaType::Game => "game",
            MediaType::YouTube => "youtube",
        }
    }

    fn base_confidence(&self) -> f32 {
        match self {
            MediaType::Anime => 0.8,
            MediaType::TvShow | MediaType::Game => 0.7,
            MediaType::YouTube => 1.0,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media mention found in one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub media_type: MediaType,
    pub title: String,
    pub url: Option<String>,
    pub confidence: f32,
}

struct StreamingService {
    name: &'static str,
    context: Vec<Regex>,
}

pub struct MediaDetector {
    patterns: Vec<(MediaType, Vec<Regex>)>,
    youtube: Regex,
    url: Regex,
    services: Vec<StreamingService>,
}

impl fmt::Debug for MediaDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDetector")
            .field("pattern_groups", &self.patterns.len())
            .finish()
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

impl MediaDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let anime = compile(&[
            r"(?i)(?:watching|watched|recommend|check out|love|enjoying)\s+(?:the\s+)?anime\s+([A-Za-z0-9\s:\-!?']+?)(?:\s+(?:is|was|it's|its|season|episode|ep\s*\d+)|[.!?,]|$)",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+(?:is|was)\s+(?:a\s+)?(?:great|good|amazing|awesome|fantastic)\s+anime",
            r"(?i)(?:started|finished|binged?)\s+([A-Za-z0-9\s:\-!?']+?)\s+(?:anime|last night|today|yesterday)",
            r"(?i)(?:anime\s+)?([A-Za-z0-9\s:\-!?']+?)\s+(?:season|S)\s*(\d+)",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+ep(?:isode)?\s*\d+",
        ])?;
        let tv_show = compile(&[
            r"(?i)(?:watching|watched|recommend|check out|binged?)\s+(?:the\s+)?(?:show|series|season)\s+([A-Za-z0-9\s:\-!?']+?)(?:\s+(?:on|is|was)|[.!?,]|$)",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+(?:on|is on)\s+(?:Netflix|Hulu|HBO|Disney\+|Amazon Prime|Apple TV)",
            r"(?i)(?:just\s+)?(?:started|finished)\s+([A-Za-z0-9\s:\-!?']+?)\s+(?:season|S)\s*\d+",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+(?:is|was)\s+(?:such\s+)?(?:a\s+)?(?:great|good|amazing|awesome)\s+(?:show|series)",
        ])?;
        let game = compile(&[
            r"(?i)(?:playing|played|recommend|check out|love|enjoying)\s+(?:the\s+)?(?:game\s+)?([A-Za-z0-9\s:\-!?']+?)(?:\s+(?:is|was|it's|on)|[.!?,]|$)",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+(?:is|was)\s+(?:such\s+)?(?:a\s+)?(?:great|good|amazing|awesome|fun)\s+game",
            r"(?i)(?:got|bought|downloaded)\s+([A-Za-z0-9\s:\-!?']+?)\s+(?:on|from)\s+(?:Steam|Epic|Xbox|PlayStation|Switch)",
            r"(?i)([A-Za-z0-9\s:\-!?']+?)\s+(?:gameplay|walkthrough|guide|review)",
        ])?;

        let services = vec![
            StreamingService {
                name: "Netflix",
                context: compile(&[r"(?i)watching on Netflix", r"(?i)check out .+ on Netflix"])?,
            },
            StreamingService {
                name: "Crunchyroll",
                context: compile(&[r"(?i)on Crunchyroll", r"(?i)watching .+ on Crunchyroll"])?,
            },
            StreamingService {
                name: "Steam",
                context: compile(&[
                    r"(?i)on Steam",
                    r"(?i)get it on Steam",
                    r"(?i)playing .+ on Steam",
                ])?,
            },
        ];

        Ok(Self {
            patterns: vec![
                (MediaType::Anime, anime),
                (MediaType::TvShow, tv_show),
                (MediaType::Game, game),
            ],
            youtube: Regex::new(
                r"(?i)(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/shorts/)([A-Za-z0-9_\-]+)",
            )?,
            url: Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#)?,
            services,
        })
    }

    /// Find every media mention in `content`.
    ///
    /// A title is reported once per message; when several categories match
    /// the same title, the first category tried (anime, then TV, then game)
    /// keeps it.
    pub fn detect(&self, content: &str) -> Vec<Detection> {
        let mut detections = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (media_type, patterns) in &self.patterns {
            for pattern in patterns {
                for caps in pattern.captures_iter(content) {
                    let Some(found) = caps.get(1) else {
                        continue;
                    };
                    let title = clean_title(found.as_str());
                    if title.chars().count() <= 2 || !seen.insert(title.clone()) {
                        continue;
                    }
                    detections.push(Detection {
                        media_type: *media_type,
                        url: self.nearby_url(content, found.start(), found.end()),
                        title,
                        confidence: media_type.base_confidence(),
                    });
                }
            }
        }

        for caps in self.youtube.captures_iter(content) {
            let Some(video_id) = caps.get(1) else {
                continue;
            };
            let title = truncate_title(format!("YouTube: {}", video_id.as_str()));
            if !seen.insert(title.clone()) {
                continue;
            }
            detections.push(Detection {
                media_type: MediaType::YouTube,
                title,
                url: Some(format!("https://youtube.com/watch?v={}", video_id.as_str())),
                confidence: MediaType::YouTube.base_confidence(),
            });
        }

        self.apply_streaming_boost(content, &mut detections);
        detections
    }

    fn apply_streaming_boost(&self, content: &str, detections: &mut [Detection]) {
        for service in &self.services {
            if !content.contains(service.name) {
                continue;
            }
            for context in &service.context {
                if !context.is_match(content) {
                    continue;
                }
                for detection in detections.iter_mut() {
                    if content.contains(&detection.title) {
                        detection.confidence = (detection.confidence + 0.1).min(1.0);
                    }
                }
            }
        }
    }

    fn nearby_url(&self, content: &str, start: usize, end: usize) -> Option<String> {
        let mut from = start.saturating_sub(URL_SEARCH_RADIUS);
        while !content.is_char_boundary(from) {
            from -= 1;
        }
        let mut to = end.saturating_add(URL_SEARCH_RADIUS).min(content.len());
        while !content.is_char_boundary(to) {
            to += 1;
        }

        self.url
            .find(&content[from..to])
            .map(|m| m.as_str().to_string())
    }
}

/// Trim surrounding punctuation, collapse double spaces, drop one trailing
/// stop word and cap the result at [`MAX_TITLE_CHARS`].
pub fn clean_title(raw: &str) -> String {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != ' ')
        .trim()
        .replace("  ", " ");

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let title = match words.split_last() {
        Some((last, rest)) if !rest.is_empty() && STOP_WORDS.contains(&last.to_lowercase().as_str()) => {
            rest.join(" ")
        }
        _ => cleaned,
    };
    truncate_title(title)
}

fn truncate_title(title: String) -> String {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((end, _)) => title[..end].trim_end().to_string(),
        None => title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> MediaDetector {
        MediaDetector::new().unwrap()
    }

    #[test]
    fn detects_anime_recommendation() {
        let found = detector().detect("I've been watching anime Frieren, it's so good");
        let anime = found
            .iter()
            .find(|d| d.media_type == MediaType::Anime)
            .expect("anime detection");
        assert_eq!(anime.title, "Frieren");
        assert!((anime.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn detects_youtube_links() {
        let found = detector().detect("lol https://youtu.be/dQw4w9WgXcQ");
        let video = found
            .iter()
            .find(|d| d.media_type == MediaType::YouTube)
            .expect("youtube detection");
        assert_eq!(video.title, "YouTube: dQw4w9WgXcQ");
        assert_eq!(
            video.url.as_deref(),
            Some("https://youtube.com/watch?v=dQw4w9WgXcQ")
        );
        assert_eq!(video.confidence, 1.0);
    }

    #[test]
    fn same_title_is_reported_once() {
        let found = detector().detect("Dark is a great show. Dark is a great show.");
        let titles: Vec<_> = found.iter().filter(|d| d.title == "Dark").collect();
        assert_eq!(titles.len(), 1);
    }

    #[test]
    fn plain_chatter_yields_nothing() {
        assert!(detector().detect("ok").is_empty());
        assert!(detector().detect("").is_empty());
    }

    #[test]
    fn short_titles_are_ignored() {
        let found = detector().detect("Go is a great game");
        assert!(found.iter().all(|d| d.title != "Go"));
    }

    #[test]
    fn steam_context_boosts_confidence() {
        let found = detector().detect("I got Hades on Steam and playing Hades on Steam");
        let game = found
            .iter()
            .find(|d| d.media_type == MediaType::Game && d.title == "Hades")
            .expect("game detection");
        assert!(game.confidence > 0.7);
        assert!(game.confidence <= 1.0);
    }

    #[test]
    fn url_search_respects_char_boundaries() {
        let content = "éééééééééééééééééééééééééééééé playing Celeste is great https://store.example/celeste";
        let found = detector().detect(content);
        let game = found
            .iter()
            .find(|d| d.title == "Celeste")
            .expect("game detection");
        assert_eq!(game.url.as_deref(), Some("https://store.example/celeste"));
    }

    #[test]
    fn clean_title_strips_punctuation_and_stop_word() {
        assert_eq!(clean_title("  \"Cowboy Bebop\"!! "), "Cowboy Bebop");
        assert_eq!(clean_title("Steins Gate the"), "Steins Gate");
        assert_eq!(clean_title("the"), "the");
    }

    #[test]
    fn long_titles_are_capped_on_a_char_boundary() {
        let raw = format!("{} season 2", "ü".repeat(40) + &" word".repeat(80));
        let found = detector().detect(&raw);
        assert!(!found.is_empty());
        for detection in &found {
            assert!(detection.title.chars().count() <= MAX_TITLE_CHARS);
        }

        let capped = clean_title(&"x".repeat(600));
        assert_eq!(capped.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(clean_title(&"é".repeat(300)).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn media_type_names() {
        assert_eq!(MediaType::TvShow.as_str(), "tv_show");
        assert_eq!(MediaType::YouTube.to_string(), "youtube");
    }
}
