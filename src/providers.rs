use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::future::join3;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    catalog::{CatalogSource, EmoteCatalog},
    config::EmoteWallConfig,
    protocol::normalize_channel,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

type Entries = Vec<(String, String)>;

/// Fetches every enabled provider concurrently and merges what arrived.
/// Failures are logged and leave that provider's table empty.
pub async fn load_catalog(config: &EmoteWallConfig) -> EmoteCatalog {
    let mut catalog = EmoteCatalog::new();
    let channel = normalize_channel(&config.channel);
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(?err, "failed building http client; starting with an empty catalog");
            return catalog;
        }
    };

    let providers = &config.providers;
    let user_id = if !channel.is_empty() && (providers.seventv || providers.bttv) {
        match fetch_user_id(&client, &channel).await {
            Ok(id) => id,
            Err(err) => {
                warn!(?err, channel = %channel, "user id lookup failed; channel emotes skipped");
                None
            }
        }
    } else {
        None
    };
    let user_id = user_id.as_deref();

    let (seventv, bttv, ffz) = join3(
        load_seventv(&client, providers.seventv, user_id),
        load_bttv(&client, providers.bttv, user_id),
        load_ffz(&client, providers.ffz, &channel),
    )
    .await;

    for (source, entries) in seventv.into_iter().chain(bttv).chain(ffz) {
        let count = catalog.extend(source, entries);
        info!(source = ?source, count, "loaded emotes");
    }
    info!(total = catalog.len(), "emote catalog ready");
    catalog
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("bad status from {url}"))?
        .json::<Value>()
        .await
        .with_context(|| format!("invalid json from {url}"))
}

async fn fetch_user_id(client: &reqwest::Client, channel: &str) -> Result<Option<String>> {
    let url = format!("https://api.ivr.fi/v2/twitch/user?login={channel}");
    let root = fetch_json(client, &url).await?;
    Ok(parse_user_id(&root))
}

async fn load_seventv(
    client: &reqwest::Client,
    enabled: bool,
    user_id: Option<&str>,
) -> Vec<(CatalogSource, Entries)> {
    let mut loaded = Vec::new();
    if !enabled {
        return loaded;
    }
    match fetch_json(client, "https://7tv.io/v3/emote-sets/global").await {
        Ok(root) => loaded.push((CatalogSource::Global, parse_seventv_global(&root))),
        Err(err) => warn!(?err, "7tv global emotes unavailable"),
    }
    if let Some(id) = user_id {
        let url = format!("https://7tv.io/v3/users/twitch/{id}");
        match fetch_json(client, &url).await {
            Ok(root) => loaded.push((CatalogSource::Channel, parse_seventv_channel(&root))),
            Err(err) => warn!(?err, user_id = id, "7tv channel emotes unavailable"),
        }
    }
    loaded
}

async fn load_bttv(
    client: &reqwest::Client,
    enabled: bool,
    user_id: Option<&str>,
) -> Vec<(CatalogSource, Entries)> {
    let mut loaded = Vec::new();
    if !enabled {
        return loaded;
    }
    match fetch_json(client, "https://api.betterttv.net/3/cached/emotes/global").await {
        Ok(root) => loaded.push((CatalogSource::Bttv, parse_bttv_list(&root))),
        Err(err) => warn!(?err, "bttv global emotes unavailable"),
    }
    if let Some(id) = user_id {
        let url = format!("https://api.betterttv.net/3/cached/users/twitch/{id}");
        match fetch_json(client, &url).await {
            Ok(root) => loaded.push((CatalogSource::Bttv, parse_bttv_channel(&root))),
            Err(err) => warn!(?err, user_id = id, "bttv channel emotes unavailable"),
        }
    }
    loaded
}

async fn load_ffz(
    client: &reqwest::Client,
    enabled: bool,
    channel: &str,
) -> Vec<(CatalogSource, Entries)> {
    if !enabled || channel.is_empty() {
        return Vec::new();
    }
    let url = format!("https://api.frankerfacez.com/v1/room/{channel}");
    match fetch_json(client, &url).await {
        Ok(root) => vec![(CatalogSource::Ffz, parse_ffz_room(&root))],
        Err(err) => {
            warn!(?err, channel = %channel, "ffz emotes unavailable");
            Vec::new()
        }
    }
}

pub fn parse_user_id(root: &Value) -> Option<String> {
    let id = root.as_array()?.first()?.get("id")?;
    match id {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// `https:<host.url>/<file>` for the widest WEBP file of a 7TV emote.
pub fn seventv_image_url(emote_data: &Value) -> Option<String> {
    let host = emote_data.get("host")?;
    let best = host
        .get("files")?
        .as_array()?
        .iter()
        .filter(|file| file.get("format").and_then(Value::as_str) == Some("WEBP"))
        .max_by_key(|file| file.get("width").and_then(Value::as_u64).unwrap_or(0))?;
    let base = match host.get("url")? {
        Value::Array(urls) => urls.first()?.as_str()?,
        other => other.as_str()?,
    };
    let file = best.get("name")?.as_str()?;
    Some(format!("https:{base}/{file}"))
}

fn seventv_entries<'a>(emotes: impl Iterator<Item = &'a Value>) -> Entries {
    emotes
        .filter_map(|emote| {
            let name = emote.get("name")?.as_str()?;
            let data = match emote.get("data") {
                Some(data) if data.get("host").is_some() => data,
                _ => emote,
            };
            Some((name.to_owned(), seventv_image_url(data)?))
        })
        .collect()
}

pub fn parse_seventv_global(root: &Value) -> Entries {
    root.get("emotes")
        .and_then(Value::as_array)
        .map(|emotes| seventv_entries(emotes.iter()))
        .unwrap_or_default()
}

pub fn parse_seventv_channel(root: &Value) -> Entries {
    root.get("emote_set")
        .and_then(|set| set.get("emotes"))
        .and_then(Value::as_array)
        .map(|emotes| seventv_entries(emotes.iter()))
        .unwrap_or_default()
}

pub fn bttv_image_url(id: &str) -> String {
    format!("https://cdn.betterttv.net/emote/{id}/3x")
}

pub fn parse_bttv_list(root: &Value) -> Entries {
    root.as_array()
        .map(|emotes| {
            emotes
                .iter()
                .filter_map(|emote| {
                    let code = emote.get("code")?.as_str()?;
                    let id = emote.get("id")?.as_str()?;
                    Some((code.to_owned(), bttv_image_url(id)))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_bttv_channel(root: &Value) -> Entries {
    ["channelEmotes", "sharedEmotes"]
        .iter()
        .filter_map(|key| root.get(*key))
        .flat_map(parse_bttv_list)
        .collect()
}

/// Largest of the `4`, `2`, `1` scale URLs; protocol-relative ones get `https:`.
pub fn ffz_image_url(urls: &Value) -> Option<String> {
    let url = ["4", "2", "1"]
        .iter()
        .filter_map(|scale| urls.get(*scale).and_then(Value::as_str))
        .find(|url| !url.is_empty())?;
    if url.starts_with("http") {
        Some(url.to_owned())
    } else {
        Some(format!("https:{url}"))
    }
}

pub fn parse_ffz_room(root: &Value) -> Entries {
    let Some(sets) = root.get("sets").and_then(Value::as_object) else {
        return Vec::new();
    };
    sets.values()
        .filter_map(|set| set.get("emoticons").and_then(Value::as_array))
        .flatten()
        .filter_map(|emote| {
            let name = emote.get("name")?.as_str()?;
            Some((name.to_owned(), ffz_image_url(emote.get("urls")?)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        ffz_image_url, parse_bttv_channel, parse_bttv_list, parse_ffz_room,
        parse_seventv_channel, parse_seventv_global, parse_user_id, seventv_image_url,
    };

    fn seventv_host(url: &str) -> serde_json::Value {
        json!({
            "url": url,
            "files": [
                { "name": "1x.webp", "width": 32, "format": "WEBP" },
                { "name": "4x.avif", "width": 128, "format": "AVIF" },
                { "name": "3x.webp", "width": 96, "format": "WEBP" },
                { "name": "2x.webp", "width": 64, "format": "WEBP" }
            ]
        })
    }

    #[test]
    fn user_id_comes_from_first_entry() {
        assert_eq!(
            parse_user_id(&json!([{ "id": "12345", "login": "core_dmp" }])),
            Some("12345".to_owned())
        );
        assert_eq!(parse_user_id(&json!([{ "id": 42 }])), Some("42".to_owned()));
        assert_eq!(parse_user_id(&json!([])), None);
        assert_eq!(parse_user_id(&json!({ "error": "not found" })), None);
    }

    #[test]
    fn seventv_picks_widest_webp() {
        let data = json!({ "host": seventv_host("//cdn.7tv.app/emote/abc") });
        assert_eq!(
            seventv_image_url(&data),
            Some("https://cdn.7tv.app/emote/abc/3x.webp".to_owned())
        );
    }

    #[test]
    fn seventv_without_webp_is_skipped() {
        let data = json!({
            "host": {
                "url": "//cdn.7tv.app/emote/abc",
                "files": [{ "name": "1x.avif", "width": 32, "format": "AVIF" }]
            }
        });
        assert_eq!(seventv_image_url(&data), None);
    }

    #[test]
    fn seventv_global_accepts_nested_or_top_level_host() {
        let root = json!({
            "emotes": [
                { "name": "EZ", "data": { "host": seventv_host("//cdn/ez") } },
                { "name": "Clap", "host": seventv_host("//cdn/clap") },
                { "name": "Broken", "data": {} }
            ]
        });
        assert_eq!(
            parse_seventv_global(&root),
            vec![
                ("EZ".to_owned(), "https://cdn/ez/3x.webp".to_owned()),
                ("Clap".to_owned(), "https://cdn/clap/3x.webp".to_owned()),
            ]
        );
    }

    #[test]
    fn seventv_channel_reads_emote_set() {
        let root = json!({
            "emote_set": {
                "emotes": [{ "name": "peepoHappy", "data": { "host": seventv_host("//cdn/ph") } }]
            }
        });
        assert_eq!(
            parse_seventv_channel(&root),
            vec![("peepoHappy".to_owned(), "https://cdn/ph/3x.webp".to_owned())]
        );
        assert!(parse_seventv_channel(&json!({ "emote_set": null })).is_empty());
    }

    #[test]
    fn bttv_global_and_channel_lists() {
        let global = json!([{ "id": "54fa925e01e468494b85b54d", "code": "OhMyGoodness" }]);
        assert_eq!(
            parse_bttv_list(&global),
            vec![(
                "OhMyGoodness".to_owned(),
                "https://cdn.betterttv.net/emote/54fa925e01e468494b85b54d/3x".to_owned()
            )]
        );

        let channel = json!({
            "channelEmotes": [{ "id": "a1", "code": "catJAM" }],
            "sharedEmotes": [{ "id": "b2", "code": "pepeD" }]
        });
        let names: Vec<String> = parse_bttv_channel(&channel)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["catJAM".to_owned(), "pepeD".to_owned()]);
    }

    #[test]
    fn ffz_prefers_largest_scale_and_adds_scheme() {
        assert_eq!(
            ffz_image_url(&json!({ "1": "//cdn.frankerfacez.com/emote/1/1", "2": "//cdn.frankerfacez.com/emote/1/2" })),
            Some("https://cdn.frankerfacez.com/emote/1/2".to_owned())
        );
        assert_eq!(
            ffz_image_url(&json!({ "4": "https://cdn/4", "1": "//cdn/1" })),
            Some("https://cdn/4".to_owned())
        );
        assert_eq!(ffz_image_url(&json!({})), None);
    }

    #[test]
    fn ffz_room_flattens_all_sets() {
        let root = json!({
            "room": { "id": "core_dmp" },
            "sets": {
                "1": { "emoticons": [{ "name": "ZreknarF", "urls": { "1": "//cdn/z1" } }] },
                "2": { "emoticons": [{ "name": "LaterSooner", "urls": { "4": "//cdn/l4" } }] }
            }
        });
        let mut entries = parse_ffz_room(&root);
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("LaterSooner".to_owned(), "https://cdn/l4".to_owned()),
                ("ZreknarF".to_owned(), "https://cdn/z1".to_owned()),
            ]
        );
    }
}
