//! Finding convertible sources in editor documents and rewriting them to published videos.
//!
//! Two document shapes are understood:
//! - timeline: `timelineData.trackItemDetailsMap[id]` with `type == "image"` and `details.src`,
//!   mirrored into `timelineData.trackItemsMap[id].details.src` when that field exists;
//! - motion graphics: `magicmotion[i].data`, mirrored into the `motion_graphics_data` entries that
//!   share its `scene` or `metadata._id`. Converted entries keep the old URL in
//!   `graphic_motion_url`.
//!
//! Rewrites edit values in place, so untouched items and key order survive unchanged.

use serde_json::Value;

use crate::batch::BatchOrchestrator;
use crate::config::ReelConfig;
use crate::foundation::error::{ReelError, ReelResult};
use crate::model::{BatchReport, requests_for_urls};

/// Location of a convertible source inside a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemRef {
    /// Key in `timelineData.trackItemDetailsMap`.
    Track(String),
    /// Index in `magicmotion`.
    Motion(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvertibleItem {
    pub item: ItemRef,
    pub src: String,
}

/// A rewritten document together with the batch that produced it.
#[derive(Clone, Debug)]
pub struct DocumentConversion {
    pub document: Value,
    pub report: BatchReport,
    /// Number of items whose source was replaced.
    pub updated: usize,
}

fn is_convertible(src: &str, cfg: &ReelConfig) -> bool {
    src.contains(&cfg.source_marker) && !cfg.is_video_source(src)
}

/// Every item that still points at a live page, in document order.
pub fn find_convertible(doc: &Value, cfg: &ReelConfig) -> ReelResult<Vec<ConvertibleItem>> {
    let details = doc.pointer("/timelineData/trackItemDetailsMap");
    let motion = doc.get("magicmotion");
    if details.is_none() && motion.is_none() {
        return Err(ReelError::validation(
            "document has neither timelineData.trackItemDetailsMap nor magicmotion",
        ));
    }

    let mut items = Vec::new();
    if let Some(map) = details {
        let map = map.as_object().ok_or_else(|| {
            ReelError::validation("timelineData.trackItemDetailsMap must be an object")
        })?;
        for (id, item) in map {
            if item.get("type").and_then(Value::as_str) != Some("image") {
                continue;
            }
            if let Some(src) = item.pointer("/details/src").and_then(Value::as_str)
                && is_convertible(src, cfg)
            {
                items.push(ConvertibleItem {
                    item: ItemRef::Track(id.clone()),
                    src: src.to_owned(),
                });
            }
        }
    }
    if let Some(list) = motion {
        let list = list
            .as_array()
            .ok_or_else(|| ReelError::validation("magicmotion must be an array"))?;
        for (idx, entry) in list.iter().enumerate() {
            if let Some(src) = entry.get("data").and_then(Value::as_str)
                && is_convertible(src, cfg)
            {
                items.push(ConvertibleItem {
                    item: ItemRef::Motion(idx),
                    src: src.to_owned(),
                });
            }
        }
    }
    Ok(items)
}

/// Replace the source of each referenced item with its new URL. Returns how many items changed.
pub fn apply_updates(doc: &mut Value, updates: &[(ItemRef, String)]) -> usize {
    let mut changed = 0;
    for (item, url) in updates {
        let hit = match item {
            ItemRef::Track(id) => update_track(doc, id, url),
            ItemRef::Motion(idx) => update_motion(doc, *idx, url),
        };
        if hit {
            changed += 1;
        }
    }
    changed
}

fn set_string(slot: Option<&mut Value>, url: &str) -> bool {
    match slot {
        Some(v) => {
            *v = Value::String(url.to_owned());
            true
        }
        None => false,
    }
}

fn update_track(doc: &mut Value, id: &str, url: &str) -> bool {
    let escaped = id.replace('~', "~0").replace('/', "~1");
    let hit = set_string(
        doc.pointer_mut(&format!(
            "/timelineData/trackItemDetailsMap/{escaped}/details/src"
        )),
        url,
    );
    if hit {
        set_string(
            doc.pointer_mut(&format!("/timelineData/trackItemsMap/{escaped}/details/src")),
            url,
        );
    }
    hit
}

fn rewrite_motion_entry(entry: &mut Value, url: &str) {
    if let Some(obj) = entry.as_object_mut() {
        let original = obj.get("data").cloned().unwrap_or(Value::Null);
        obj.insert("graphic_motion_url".to_owned(), original);
        obj.insert("data".to_owned(), Value::String(url.to_owned()));
    }
}

fn same_field(a: &Value, b: &Value, pointer: &str) -> bool {
    match (a.pointer(pointer), b.pointer(pointer)) {
        (Some(x), Some(y)) => !x.is_null() && x == y,
        _ => false,
    }
}

fn update_motion(doc: &mut Value, idx: usize, url: &str) -> bool {
    let Some(source) = doc
        .get("magicmotion")
        .and_then(|m| m.get(idx))
        .cloned()
    else {
        return false;
    };
    if let Some(entry) = doc.get_mut("magicmotion").and_then(|m| m.get_mut(idx)) {
        rewrite_motion_entry(entry, url);
    }
    if let Some(mirror) = doc
        .get_mut("motion_graphics_data")
        .and_then(Value::as_array_mut)
    {
        for entry in mirror.iter_mut() {
            if same_field(&source, entry, "/scene") || same_field(&source, entry, "/metadata/_id")
            {
                rewrite_motion_entry(entry, url);
            }
        }
    }
    true
}

/// Convert every live-page item of `doc` and return the rewritten copy.
///
/// Under the abort policy any failure fails the whole conversion and nothing is rewritten. Under
/// the continue policy failed items keep their original source.
#[tracing::instrument(name = "convert_document", skip_all)]
pub async fn convert_document(
    doc: &Value,
    orchestrator: &BatchOrchestrator,
    cfg: &ReelConfig,
) -> ReelResult<DocumentConversion> {
    let items = find_convertible(doc, cfg)?;
    tracing::info!(items = items.len(), "convertible items found");

    let urls: Vec<String> = items.iter().map(|i| i.src.clone()).collect();
    let requests = requests_for_urls(&urls, cfg.default_duration_secs, cfg.frame_rate)?;
    let report = orchestrator.run(&requests).await?;

    let updates: Vec<(ItemRef, String)> = items
        .iter()
        .zip(&report.results)
        .filter_map(|(item, result)| match (&result.asset_url, result.success) {
            (Some(url), true) => Some((item.item.clone(), url.clone())),
            _ => None,
        })
        .collect();

    let mut document = doc.clone();
    let updated = apply_updates(&mut document, &updates);
    tracing::info!(updated, failed = report.failed, "document rewritten");
    Ok(DocumentConversion {
        document,
        report,
        updated,
    })
}

#[cfg(test)]
#[path = "../tests/unit/document.rs"]
mod tests;
