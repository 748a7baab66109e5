//! Field reconciliation engine.
//!
//! Given the source field's token set and the target field's token set,
//! decide whether the target needs an update and compute the merged
//! result. All comparisons are exact string equality over tokens that
//! the codec has already coerced; merging is plain set union, so
//! re-running over an already-merged target converges to a no-op.

use crate::directory::UserDirectory;
use crate::field::TokenSet;

/// Verdict for one issue's reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The source field held no value; nothing to copy.
    SkipNoSource,
    /// Every source token is already present in the target.
    AlreadyPresent { present: TokenSet },
    /// The target needs the merged set written back. `added` is the
    /// subset that was not yet present, for reporting.
    Update { merged: TokenSet, added: TokenSet },
    /// A source token has no directory entry. The whole issue fails
    /// closed: no merge is computed and nothing may be written.
    UnresolvedUser { token: String },
}

/// Reconcile one issue's source tokens against its target tokens.
///
/// When `directory` is given the engine operates in user-id mode:
/// every source token is a display name and is mapped to its user id
/// before the set comparison. A single unmapped name fails the entire
/// issue rather than allowing a partial write. Blank tokens resolve to
/// "no user" and contribute nothing to the merge, so a blank alone can
/// never trigger an update.
#[must_use]
pub fn reconcile(
    source: &TokenSet,
    target: &TokenSet,
    directory: Option<&UserDirectory>,
) -> Outcome {
    if source.is_empty() {
        return Outcome::SkipNoSource;
    }

    let resolved: TokenSet = if let Some(directory) = directory {
        let mut resolved = TokenSet::new();
        for token in source {
            match directory.name_to_id(token) {
                Some(id) => {
                    if !id.is_empty() {
                        resolved.insert(id.to_owned());
                    }
                }
                None => {
                    return Outcome::UnresolvedUser {
                        token: token.clone(),
                    };
                }
            }
        }
        resolved
    } else {
        source.iter().filter(|t| !t.is_empty()).cloned().collect()
    };

    if resolved.is_empty() {
        return Outcome::SkipNoSource;
    }

    let added: TokenSet = resolved.difference(target).cloned().collect();
    if added.is_empty() {
        return Outcome::AlreadyPresent { present: resolved };
    }

    let merged: TokenSet = resolved.union(target).cloned().collect();
    Outcome::Update { merged, added }
}
