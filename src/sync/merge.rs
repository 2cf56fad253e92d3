use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::feed::FeedItem;
use crate::model::Episode;

/// Result of merging freshly fetched items into a recorded episode list
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// New episodes (source order) followed by every previously recorded one
    pub episodes: Vec<Episode>,
    /// Number of episodes that were not recorded before
    pub new_count: usize,
}

/// Merge freshly extracted items into the prior episode list.
///
/// Items whose identity (guid, else url) is already recorded are dropped; the
/// recorded copy wins. Remaining items are prepended in source order and
/// marked new, prior episodes are kept in their order and marked not new. A
/// feed that repeats an identity contributes it once, at the position of its
/// first occurrence with the content of its last.
///
/// When nothing new arrived the prior list is returned untouched, flags
/// included, so repeating a sync against an unchanged feed is a no-op.
pub fn merge_episodes(podcast_id: &str, prior: Vec<Episode>, fresh: Vec<FeedItem>) -> MergeOutcome {
    let new_items = unseen_items(&prior, fresh);

    if new_items.is_empty() {
        return MergeOutcome {
            episodes: prior,
            new_count: 0,
        };
    }

    let new_count = new_items.len();
    let mut episodes = Vec::with_capacity(new_count + prior.len());
    episodes.extend(
        new_items
            .into_iter()
            .map(|item| new_episode(podcast_id, item)),
    );
    episodes.extend(prior.into_iter().map(|mut episode| {
        episode.is_new = false;
        episode
    }));

    MergeOutcome {
        episodes,
        new_count,
    }
}

/// Fresh items not yet recorded, collapsed by identity
fn unseen_items(prior: &[Episode], fresh: Vec<FeedItem>) -> Vec<FeedItem> {
    let known: HashSet<&str> = prior.iter().map(Episode::identity).collect();
    let mut unseen: Vec<FeedItem> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in fresh {
        if known.contains(item.identity()) {
            continue;
        }
        match positions.get(item.identity()) {
            Some(&index) => unseen[index] = item,
            None => {
                positions.insert(item.identity().to_string(), unseen.len());
                unseen.push(item);
            }
        }
    }

    unseen
}

fn new_episode(podcast_id: &str, item: FeedItem) -> Episode {
    let id = item
        .guid
        .clone()
        .unwrap_or_else(|| synthesize_episode_id(&item.url));

    Episode {
        id,
        guid: item.guid,
        title: item.title,
        url: item.url,
        mime_type: item.mime_type,
        size: item.length,
        pub_date: item.pub_date,
        duration: item.duration,
        description: item.description,
        podcast_id: podcast_id.to_string(),
        is_new: true,
    }
}

/// Id for an item without a guid; its url is its identity, so this is unique
/// among the items of one merge.
fn synthesize_episode_id(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("ep-{}", &digest[..12])
}
