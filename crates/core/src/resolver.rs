use okr_copilot_common::Named;
use tracing::warn;
use uuid::Uuid;

/// Outcome of resolving a human-supplied name to an entity ID.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Uuid),
    NotFound,
    Ambiguous(Vec<(Uuid, String)>),
}

/// Strict resolution: exactly one match or nothing. Used by create-parent and
/// delete flows; the system never guesses among duplicates here.
pub fn resolve_unique<T: Named>(name: &str, candidates: &[T]) -> Resolution {
    let matches = matching(name, candidates);
    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Resolved(matches[0].entity_id()),
        _ => Resolution::Ambiguous(
            matches
                .iter()
                .map(|candidate| (candidate.entity_id(), candidate.display_name().to_string()))
                .collect(),
        ),
    }
}

/// Lenient resolution used by update flows: on duplicates, takes the first
/// match and logs a warning. Kept deliberately distinct from `resolve_unique`;
/// the asymmetry mirrors established product behavior.
pub fn resolve_first_with_warning<T: Named>(name: &str, candidates: &[T]) -> Resolution {
    let matches = matching(name, candidates);
    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Resolved(matches[0].entity_id()),
        n => {
            warn!(
                "{} entities named '{}'; updating the first match {}",
                n,
                name,
                matches[0].entity_id()
            );
            Resolution::Resolved(matches[0].entity_id())
        }
    }
}

fn matching<'a, T: Named>(name: &str, candidates: &'a [T]) -> Vec<&'a T> {
    candidates
        .iter()
        .filter(|candidate| candidate.display_name().eq_ignore_ascii_case(name))
        .collect()
}

pub fn not_found_message(entity_kind: &str, name: &str) -> String {
    format!("I couldn't find a {} named '{}'.", entity_kind, name)
}

pub fn ambiguous_message(entity_kind: &str, name: &str, candidates: &[(Uuid, String)]) -> String {
    let listing = candidates
        .iter()
        .map(|(id, candidate_name)| format!("'{}' ({})", candidate_name, id))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Several {}s are named '{}': {}. Please specify which one by id.",
        entity_kind, name, listing
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use okr_copilot_common::Team;

    fn team(name: &str) -> Team {
        Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_unique_resolution() {
        let teams = vec![team("Growth"), team("Platform")];
        match resolve_unique("growth", &teams) {
            Resolution::Resolved(id) => assert_eq!(id, teams[0].id),
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let teams = vec![team("Growth")];
        assert_eq!(resolve_unique("Sales", &teams), Resolution::NotFound);
        assert_eq!(
            resolve_first_with_warning("Sales", &teams),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_duplicate_names_require_disambiguation_on_strict_path() {
        let teams = vec![team("Growth"), team("Growth")];
        match resolve_unique("Growth", &teams) {
            Resolution::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    // Update flows keep the legacy first-match behavior; this asymmetry with
    // the strict path is intentional, pending product clarification.
    #[test]
    fn test_duplicate_names_take_first_match_on_update_path() {
        let teams = vec![team("Growth"), team("Growth")];
        assert_eq!(
            resolve_first_with_warning("Growth", &teams),
            Resolution::Resolved(teams[0].id)
        );
    }

    #[test]
    fn test_messages_name_the_entity() {
        let message = not_found_message("team", "Sales");
        assert!(message.contains("Sales"));

        let candidates = vec![(Uuid::new_v4(), "Growth".to_string())];
        let message = ambiguous_message("team", "Growth", &candidates);
        assert!(message.contains("specify which one"));
    }
}
