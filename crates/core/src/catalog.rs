use okr_copilot_common::GENERAL_INTENT;

/// One registered intent: name plus per-parameter extraction hints fed to the
/// classifier prompt. The table is static; there is no runtime discovery.
#[derive(Debug, Clone, Copy)]
pub struct IntentDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameter_hints: &'static [(&'static str, &'static str)],
}

const NAME_HINT: (&str, &str) = ("name", "the entity's name or title, verbatim");
const ID_HINT: (&str, &str) = ("id", "the entity's id, only if the user supplied one");

pub const CATALOG: &[IntentDefinition] = &[
    IntentDefinition {
        name: "CreateTeam",
        description: "Create a new team",
        parameter_hints: &[NAME_HINT, ("description", "optional team description")],
    },
    IntentDefinition {
        name: "UpdateTeam",
        description: "Rename or change an existing team",
        parameter_hints: &[NAME_HINT, ID_HINT, ("new_name", "the new team name, if renaming")],
    },
    IntentDefinition {
        name: "DeleteTeam",
        description: "Delete a team",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchTeams",
        description: "Find teams by name",
        parameter_hints: &[("query", "the name fragment to search for")],
    },
    IntentDefinition {
        name: "CreateUser",
        description: "Register a new user",
        parameter_hints: &[
            NAME_HINT,
            ("email", "the user's email address"),
            ("team", "team name to place the user in, if mentioned"),
        ],
    },
    IntentDefinition {
        name: "UpdateUser",
        description: "Change a user's details or team",
        parameter_hints: &[NAME_HINT, ID_HINT, ("email", "new email, if changing"), ("team", "new team name, if moving")],
    },
    IntentDefinition {
        name: "DeleteUser",
        description: "Remove a user",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchUsers",
        description: "Find users by name",
        parameter_hints: &[("query", "the name fragment to search for")],
    },
    IntentDefinition {
        name: "CreateOkrSession",
        description: "Create an OKR session for a team",
        parameter_hints: &[
            ("title", "the session title, verbatim"),
            ("team", "the owning team's name"),
            ("start_date", "start date as YYYY-MM-DD"),
            ("end_date", "end date as YYYY-MM-DD"),
        ],
    },
    IntentDefinition {
        name: "UpdateOkrSession",
        description: "Change an OKR session's title or dates",
        parameter_hints: &[
            NAME_HINT,
            ID_HINT,
            ("new_title", "new title, if renaming"),
            ("start_date", "new start date as YYYY-MM-DD, if changing"),
            ("end_date", "new end date as YYYY-MM-DD, if changing"),
        ],
    },
    IntentDefinition {
        name: "DeleteOkrSession",
        description: "Delete an OKR session",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchOkrSessions",
        description: "Find OKR sessions by title",
        parameter_hints: &[("query", "the title fragment to search for")],
    },
    IntentDefinition {
        name: "CreateObjective",
        description: "Add an objective to an OKR session",
        parameter_hints: &[
            ("title", "the objective title, verbatim"),
            ("session", "the owning session's title"),
            ("description", "optional objective description"),
        ],
    },
    IntentDefinition {
        name: "UpdateObjective",
        description: "Change an objective",
        parameter_hints: &[NAME_HINT, ID_HINT, ("new_title", "new title, if renaming")],
    },
    IntentDefinition {
        name: "DeleteObjective",
        description: "Delete an objective",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchObjectives",
        description: "Find objectives by title or list those in a session",
        parameter_hints: &[("query", "the title fragment"), ("session", "session title, if listing")],
    },
    IntentDefinition {
        name: "CreateKeyResult",
        description: "Add a key result to an objective",
        parameter_hints: &[
            ("title", "the key result title, verbatim"),
            ("objective", "the owning objective's title"),
            ("start_date", "start date as YYYY-MM-DD"),
            ("end_date", "end date as YYYY-MM-DD"),
        ],
    },
    IntentDefinition {
        name: "UpdateKeyResult",
        description: "Change a key result",
        parameter_hints: &[
            NAME_HINT,
            ID_HINT,
            ("new_title", "new title, if renaming"),
            ("start_date", "new start date, if changing"),
            ("end_date", "new end date, if changing"),
        ],
    },
    IntentDefinition {
        name: "DeleteKeyResult",
        description: "Delete a key result",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchKeyResults",
        description: "Find key results by title or list those in an objective",
        parameter_hints: &[("query", "the title fragment"), ("objective", "objective title, if listing")],
    },
    IntentDefinition {
        name: "CreateTask",
        description: "Add a task to a key result",
        parameter_hints: &[
            ("title", "the task title, verbatim"),
            ("key_result", "the owning key result's title"),
            ("assignee", "name of the person assigned, if mentioned"),
            ("priority", "High, Medium or Low, if mentioned"),
            ("due_date", "due date as YYYY-MM-DD, if mentioned"),
        ],
    },
    IntentDefinition {
        name: "UpdateTask",
        description: "Change a task's title, status or priority",
        parameter_hints: &[
            NAME_HINT,
            ID_HINT,
            ("new_title", "new title, if renaming"),
            ("status", "Todo, InProgress or Completed, if changing"),
            ("priority", "High, Medium or Low, if changing"),
        ],
    },
    IntentDefinition {
        name: "DeleteTask",
        description: "Delete a task",
        parameter_hints: &[NAME_HINT, ID_HINT],
    },
    IntentDefinition {
        name: "SearchTasks",
        description: "Find tasks by title or list those under a key result",
        parameter_hints: &[("query", "the title fragment"), ("key_result", "key result title, if listing")],
    },
    IntentDefinition {
        name: "AssignTask",
        description: "Assign a task to a person",
        parameter_hints: &[NAME_HINT, ID_HINT, ("assignee", "name of the person to assign")],
    },
    IntentDefinition {
        name: "GenerateRiskReport",
        description: "Run the multi-step OKR risk analysis report",
        parameter_hints: &[("session", "session title to analyze, if mentioned")],
    },
    IntentDefinition {
        name: GENERAL_INTENT,
        description: "Small talk or anything not matching another intent",
        parameter_hints: &[],
    },
];

pub fn find_intent(name: &str) -> Option<&'static IntentDefinition> {
    CATALOG.iter().find(|definition| definition.name == name)
}

/// Verbose catalog rendering: one block per intent with every parameter hint.
pub fn render_full_catalog() -> String {
    let mut out = String::new();
    for definition in CATALOG {
        out.push_str(&format!("### {}\n{}\n", definition.name, definition.description));
        for (parameter, hint) in definition.parameter_hints {
            out.push_str(&format!("- {}: {}\n", parameter, hint));
        }
        out.push('\n');
    }
    out
}

/// One line per intent, for providers with tight context windows.
pub fn render_condensed_catalog() -> String {
    let mut out = String::new();
    for definition in CATALOG {
        let parameters = definition
            .parameter_hints
            .iter()
            .map(|(parameter, _)| *parameter)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("{}({})\n", definition.name, parameters));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        for (index, definition) in CATALOG.iter().enumerate() {
            assert!(
                !CATALOG[index + 1..].iter().any(|other| other.name == definition.name),
                "duplicate intent name {}",
                definition.name
            );
        }
    }

    #[test]
    fn test_catalog_contains_general_fallback() {
        assert!(find_intent(GENERAL_INTENT).is_some());
        assert!(find_intent("CreateTeam").is_some());
        assert!(find_intent("LaunchRocket").is_none());
    }

    #[test]
    fn test_condensed_catalog_is_smaller() {
        let full = render_full_catalog();
        let condensed = render_condensed_catalog();
        assert!(condensed.len() < full.len());
        assert!(condensed.contains("CreateOkrSession(title, team, start_date, end_date)"));
    }
}
