use crate::error::ResultError;
use model::{
    artifact::{ArtifactRef, ArtifactSpec, PublishState},
    item::GeneratedContent,
    target::{PageTarget, slugify},
};
use serde_json::Value;

/// Decodes a completed item's payload for the page kind it belongs to.
pub fn decode_payload(
    target: &PageTarget,
    payload: &Value,
) -> Result<GeneratedContent, ResultError> {
    let kind = target.kind();
    let content: GeneratedContent =
        serde_json::from_value(payload.clone()).map_err(|e| ResultError::Malformed {
            kind,
            reason: e.to_string(),
        })?;

    if content.body.trim().is_empty() {
        return Err(ResultError::Malformed {
            kind,
            reason: "empty body".into(),
        });
    }

    Ok(content)
}

/// Builds the artifact the content store is asked to persist.
pub fn artifact_spec(
    target: &PageTarget,
    content: &GeneratedContent,
    state: PublishState,
    replaces: Option<ArtifactRef>,
) -> ArtifactSpec {
    let (slug, default_meta) = match target {
        PageTarget::Hub { service } => (slugify(service), format!("{service} services")),
        PageTarget::Leaf {
            service,
            city,
            state,
        } => (
            slugify(&format!("{service} {city} {state}")),
            format!("{service} in {city}, {state}"),
        ),
        PageTarget::CityHub { city, state } => (
            slugify(&format!("{city} {state}")),
            format!("Services in {city}, {state}"),
        ),
    };

    let title = if content.title.trim().is_empty() {
        target.label()
    } else {
        content.title.trim().to_string()
    };

    ArtifactSpec {
        canonical_key: target.canonical_key(),
        kind: target.kind(),
        title,
        slug,
        body: content.body.clone(),
        excerpt: content.excerpt.clone(),
        meta_description: content
            .meta_description
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or(Some(default_meta)),
        state,
        replaces,
    }
}
