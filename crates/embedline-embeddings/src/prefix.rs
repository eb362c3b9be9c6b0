//! Choosing the task prefix and output width for an embed call.

use tracing::warn;

use crate::encoder::{SequenceEncoder, TokenId};
use crate::errors::{EmbeddingError, Result};
use crate::profiles::EmbeddingProfile;

/// Prefix text to prepend to every input.
///
/// An explicit `task` must be one the profile knows; unknown models accept
/// any task verbatim. Without a task, the query prefix is used for retrieval
/// and the document prefix otherwise.
pub fn resolve_prefix(
    profile: Option<&EmbeddingProfile>,
    model: &str,
    is_retrieval: bool,
    task: Option<&str>,
) -> Result<String> {
    match (profile, task) {
        (Some(profile), Some(task)) => {
            if profile.accepts_task(task) {
                Ok(task.to_owned())
            } else {
                Err(EmbeddingError::InvalidTaskPrefix {
                    prefix: task.to_owned(),
                    model: model.to_owned(),
                })
            }
        }
        (None, Some(task)) => Ok(task.to_owned()),
        (Some(profile), None) => Ok(if is_retrieval {
            profile.query_prefix.to_owned()
        } else {
            profile.document_prefix.to_owned()
        }),
        (None, None) => {
            warn!(model, "unknown model, assuming no prefix");
            Ok(String::new())
        }
    }
}

/// Output width for a request of `requested` dimensions (`None` = native).
///
/// Anything but the native width needs a nested-capable profile and a value
/// in `1..=native`.
pub fn resolve_dimensionality(
    profile: Option<&EmbeddingProfile>,
    model: &str,
    native: usize,
    requested: Option<usize>,
) -> Result<usize> {
    let Some(requested) = requested else {
        return Ok(native);
    };
    if requested == native {
        return Ok(native);
    }

    let nested = profile.filter(|p| p.nested_capable);
    if nested.is_some() && (1..=native).contains(&requested) {
        return Ok(requested);
    }

    let hint = match nested.and_then(EmbeddingProfile::recommended_hint) {
        Some(list) => format!("recommended: {list}"),
        None => format!("supported: {native}"),
    };
    Err(EmbeddingError::UnsupportedDimensionality {
        requested,
        model: model.to_owned(),
        hint,
    })
}

/// Tokens placed in front of every chunk.
///
/// An empty prefix is just the beginning-of-sequence token; otherwise
/// `prefix + ":"` is tokenized with the leading marker.
pub fn tokenize_prefix<E>(encoder: &E, prefix: &str) -> Result<Vec<TokenId>>
where
    E: SequenceEncoder + ?Sized,
{
    if prefix.is_empty() {
        return Ok(vec![encoder.bos_token()]);
    }
    encoder.tokenize(&format!("{prefix}:"), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEncoder;
    use crate::profiles::{self, BGE, E5, NOMIC, NOMIC_V1_5};
    use assert_matches::assert_matches;
    use embedline_core::logging::capture_logs;

    #[test]
    fn retrieval_flag_picks_prefix() {
        let doc = resolve_prefix(Some(&NOMIC), "nomic-embed-text-v1", false, None).unwrap();
        let query = resolve_prefix(Some(&NOMIC), "nomic-embed-text-v1", true, None).unwrap();
        assert_eq!(doc, "search_document");
        assert_eq!(query, "search_query");
    }

    #[test]
    fn bge_documents_have_no_prefix() {
        assert_eq!(resolve_prefix(Some(&BGE), "bge-base-en", false, None).unwrap(), "");
        assert!(
            resolve_prefix(Some(&BGE), "bge-base-en", true, None)
                .unwrap()
                .starts_with("Represent this sentence")
        );
    }

    #[test]
    fn explicit_task_must_be_known() {
        let ok = resolve_prefix(Some(&NOMIC), "nomic-embed-text-v1", false, Some("clustering"));
        assert_eq!(ok.unwrap(), "clustering");

        let err = resolve_prefix(Some(&E5), "e5-base", true, Some("search_query")).unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::InvalidTaskPrefix { ref prefix, ref model }
                if prefix == "search_query" && model == "e5-base"
        );
    }

    #[test]
    fn explicit_task_overrides_retrieval_flag() {
        let prefix = resolve_prefix(Some(&E5), "e5-base", true, Some("passage")).unwrap();
        assert_eq!(prefix, "passage");
    }

    #[test]
    fn unknown_model_accepts_any_task() {
        let prefix = resolve_prefix(None, "my-model", false, Some("anything goes")).unwrap();
        assert_eq!(prefix, "anything goes");
    }

    #[test]
    fn unknown_model_without_task_warns() {
        let (logs, _guard) = capture_logs();
        let prefix = resolve_prefix(None, "my-model", true, None).unwrap();
        assert_eq!(prefix, "");
        let warnings = logs.warnings("assuming no prefix");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("model"), Some("my-model"));
    }

    #[test]
    fn native_width_always_allowed() {
        for (profile, _) in profiles::PROFILE_TABLE {
            assert_eq!(resolve_dimensionality(Some(*profile), "m", 384, None).unwrap(), 384);
            assert_eq!(resolve_dimensionality(Some(*profile), "m", 384, Some(384)).unwrap(), 384);
        }
        assert_eq!(resolve_dimensionality(None, "m", 384, Some(384)).unwrap(), 384);
    }

    #[test]
    fn nested_profile_allows_truncation() {
        let dims = resolve_dimensionality(Some(&NOMIC_V1_5), "nomic-embed-text-v1.5", 768, Some(256));
        assert_eq!(dims.unwrap(), 256);
        // Not restricted to the recommended set
        let dims = resolve_dimensionality(Some(&NOMIC_V1_5), "nomic-embed-text-v1.5", 768, Some(100));
        assert_eq!(dims.unwrap(), 100);
    }

    #[test]
    fn nested_profile_rejects_out_of_range() {
        for requested in [0, 769] {
            let err =
                resolve_dimensionality(Some(&NOMIC_V1_5), "nomic-embed-text-v1.5", 768, Some(requested))
                    .unwrap_err();
            assert_matches!(
                err,
                EmbeddingError::UnsupportedDimensionality { ref hint, .. }
                    if hint == "recommended: 768, 512, 384, 256, 128"
            );
        }
    }

    #[test]
    fn plain_profile_rejects_non_native() {
        let err = resolve_dimensionality(Some(&NOMIC), "nomic-embed-text-v1", 768, Some(769)).unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::UnsupportedDimensionality { requested: 769, ref hint, .. }
                if hint == "supported: 768"
        );
        let err = resolve_dimensionality(Some(&BGE), "bge-base-en", 768, Some(256)).unwrap_err();
        assert_matches!(err, EmbeddingError::UnsupportedDimensionality { requested: 256, .. });
    }

    #[test]
    fn unknown_model_is_native_only() {
        let err = resolve_dimensionality(None, "my-model", 512, Some(128)).unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::UnsupportedDimensionality { ref model, .. } if model == "my-model"
        );
    }

    #[test]
    fn empty_prefix_is_bos_only() {
        let enc = MockEncoder::new(8, 64);
        assert_eq!(tokenize_prefix(&enc, "").unwrap(), vec![enc.bos_token()]);
    }

    #[test]
    fn prefix_gets_colon_and_bos() {
        let enc = MockEncoder::new(8, 64);
        let tokens = tokenize_prefix(&enc, "search_query").unwrap();
        assert_eq!(tokens, enc.tokenize("search_query:", true).unwrap());
        assert_eq!(tokens[0], enc.bos_token());
        assert_eq!(tokens.len(), 2);
    }
}
