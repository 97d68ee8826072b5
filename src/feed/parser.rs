use anyhow::Result;
use feed_rs::model::{Entry, MediaObject};
use feed_rs::parser;

use crate::storage::{Enclosure, RawEpisode};

/// A podcast feed reduced to what reconciliation needs.
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub episodes: Vec<RawEpisode>,
    /// Entries dropped because they carried neither a link nor an enclosure
    pub skipped: usize,
}

pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument> {
    let feed = parser::parse(bytes)?;

    let mut skipped = 0;
    let episodes: Vec<RawEpisode> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let episode = entry_to_episode(entry);
            if episode.is_none() {
                skipped += 1;
            }
            episode
        })
        .collect();

    Ok(FeedDocument {
        episodes,
        skipped,
    })
}

fn entry_to_episode(entry: Entry) -> Option<RawEpisode> {
    let link = entry.links.first().map(|l| l.href.clone());
    let enclosure = entry.media.iter().find_map(media_enclosure);
    let url = link
        .clone()
        .or_else(|| enclosure.as_ref().map(|e| e.url.clone()))?;

    let duration = entry.media.iter().find_map(media_duration);
    let image = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();
    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
        });
    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    Some(RawEpisode {
        url,
        title,
        description,
        duration,
        publication_date: entry.published.or(entry.updated),
        enclosure,
        link,
        image,
    })
}

fn media_enclosure(media: &MediaObject) -> Option<Enclosure> {
    media.content.iter().find_map(|content| {
        content.url.as_ref().map(|url| Enclosure {
            url: url.to_string(),
            media_type: content.content_type.as_ref().map(|m| m.to_string()),
            length: content.size,
        })
    })
}

fn media_duration(media: &MediaObject) -> Option<i64> {
    media
        .duration
        .or_else(|| media.content.iter().find_map(|c| c.duration))
        .and_then(|d| i64::try_from(d.as_secs()).ok())
}
