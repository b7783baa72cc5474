//! Input validation for drafts, requirements and application forms.
//!
//! Every function here normalises its input (trimming whitespace, turning
//! blank optional text into `None`) and returns a `PartyError::Validation`
//! whose message is shown to the user verbatim.

use std::collections::HashMap;

use crate::error::PartyError;
use crate::model::{
    Answer, Requirement, MAX_ANNOUNCEMENT_LEN, MAX_ANSWER_LEN, MAX_DESCRIPTION_LEN, MAX_MEMBERS,
    MAX_REQUIREMENTS, MAX_REQUIREMENT_DESCRIPTION_LEN, MAX_REQUIREMENT_NAME_LEN, MAX_TITLE_LEN,
    MIN_MEMBERS,
};

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn title(raw: &str) -> Result<String, PartyError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(PartyError::validation("Party title cannot be empty."));
    }
    if char_len(title) > MAX_TITLE_LEN {
        return Err(PartyError::validation(format!(
            "Party title must be at most {} characters.",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

pub fn max_members(max_members: u32) -> Result<u32, PartyError> {
    if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&max_members) {
        return Err(PartyError::validation(format!(
            "Max members must be between {} and {}.",
            MIN_MEMBERS, MAX_MEMBERS
        )));
    }
    Ok(max_members)
}

pub fn description(raw: Option<&str>) -> Result<Option<String>, PartyError> {
    let description = optional_text(raw);
    if let Some(d) = &description {
        if char_len(d) > MAX_DESCRIPTION_LEN {
            return Err(PartyError::validation(format!(
                "Description must be at most {} characters.",
                MAX_DESCRIPTION_LEN
            )));
        }
    }
    Ok(description)
}

pub fn requirement(name: &str, description: Option<&str>) -> Result<Requirement, PartyError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PartyError::validation("Requirement name cannot be empty."));
    }
    if char_len(name) > MAX_REQUIREMENT_NAME_LEN {
        return Err(PartyError::validation(format!(
            "Requirement name must be at most {} characters.",
            MAX_REQUIREMENT_NAME_LEN
        )));
    }
    // Answers arrive as `name: answer | name: answer`
    if name.contains([':', '|']) {
        return Err(PartyError::validation(
            "Requirement names cannot contain ':' or '|'.",
        ));
    }
    let description = optional_text(description);
    if let Some(d) = &description {
        if char_len(d) > MAX_REQUIREMENT_DESCRIPTION_LEN {
            return Err(PartyError::validation(format!(
                "Requirement description must be at most {} characters.",
                MAX_REQUIREMENT_DESCRIPTION_LEN
            )));
        }
    }
    Ok(Requirement::new(name, description))
}

/// Validate a whole ordered requirement set.
///
/// Names must be unique ignoring case, since application answers are keyed
/// by requirement name.
pub fn requirement_set(requirements: &[Requirement]) -> Result<(), PartyError> {
    if requirements.len() > MAX_REQUIREMENTS {
        return Err(PartyError::validation(format!(
            "A party can have at most {} requirements.",
            MAX_REQUIREMENTS
        )));
    }
    for (i, req) in requirements.iter().enumerate() {
        let normalised = requirement(&req.name, req.description.as_deref())?;
        if normalised != *req {
            return Err(PartyError::validation(format!(
                "Requirement \"{}\" is not normalised.",
                req.name
            )));
        }
        if requirements[..i]
            .iter()
            .any(|earlier| earlier.name.eq_ignore_ascii_case(&req.name))
        {
            return Err(PartyError::validation(format!(
                "Requirement \"{}\" is listed more than once.",
                req.name
            )));
        }
    }
    Ok(())
}

/// Match form responses against a party's requirements.
///
/// Keys are matched to requirement names ignoring case and must cover every
/// requirement exactly once. Answers come back in requirement order, keyed by
/// the requirement's canonical name.
pub fn answers(
    requirements: &[Requirement],
    responses: &HashMap<String, String>,
) -> Result<Vec<Answer>, PartyError> {
    let mut matched: Vec<Option<String>> = vec![None; requirements.len()];

    for (key, value) in responses {
        let index = requirements
            .iter()
            .position(|r| r.name.eq_ignore_ascii_case(key.trim()))
            .ok_or_else(|| {
                PartyError::validation(format!("\"{}\" is not a requirement of this party.", key))
            })?;
        if matched[index].is_some() {
            return Err(PartyError::validation(format!(
                "\"{}\" was answered more than once.",
                requirements[index].name
            )));
        }
        let answer = value.trim();
        if answer.is_empty() {
            return Err(PartyError::validation(format!(
                "Please answer \"{}\".",
                requirements[index].name
            )));
        }
        if char_len(answer) > MAX_ANSWER_LEN {
            return Err(PartyError::validation(format!(
                "The answer to \"{}\" must be at most {} characters.",
                requirements[index].name, MAX_ANSWER_LEN
            )));
        }
        matched[index] = Some(answer.to_string());
    }

    requirements
        .iter()
        .zip(matched)
        .map(|(req, answer)| match answer {
            Some(answer) => Ok(Answer {
                requirement: req.name.clone(),
                answer,
            }),
            None => Err(PartyError::validation(format!(
                "Please answer \"{}\".",
                req.name
            ))),
        })
        .collect()
}

pub fn announcement(body: &str) -> Result<String, PartyError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(PartyError::validation("Message cannot be empty."));
    }
    if char_len(body) > MAX_ANNOUNCEMENT_LEN {
        return Err(PartyError::validation(format!(
            "Message must be at most {} characters.",
            MAX_ANNOUNCEMENT_LEN
        )));
    }
    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(names: &[&str]) -> Vec<Requirement> {
        names.iter().map(|n| Requirement::new(*n, None)).collect()
    }

    fn responses(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_title_is_trimmed_and_required() {
        assert_eq!(title("  Ranked night ").unwrap(), "Ranked night");
        assert!(matches!(title("   "), Err(PartyError::Validation(_))));
        assert!(title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn test_max_members_bounds() {
        assert!(max_members(1).is_err());
        assert_eq!(max_members(2).unwrap(), 2);
        assert_eq!(max_members(20).unwrap(), 20);
        assert!(max_members(21).is_err());
    }

    #[test]
    fn test_requirement_limits() {
        let req = requirement(" Rank ", Some("  ")).unwrap();
        assert_eq!(req, Requirement::new("Rank", None));

        assert!(requirement("", None).is_err());
        assert!(requirement(&"n".repeat(MAX_REQUIREMENT_NAME_LEN + 1), None).is_err());
        assert!(requirement(
            "Rank",
            Some(&"d".repeat(MAX_REQUIREMENT_DESCRIPTION_LEN + 1))
        )
        .is_err());
        // Limits count characters, not bytes
        assert!(requirement(&"é".repeat(MAX_REQUIREMENT_NAME_LEN), None).is_ok());
    }

    #[test]
    fn test_requirement_name_rejects_answer_separators() {
        assert!(matches!(
            requirement("Rank: solo queue", None),
            Err(PartyError::Validation(_))
        ));
        assert!(matches!(
            requirement("Rank|Role", None),
            Err(PartyError::Validation(_))
        ));
        // Descriptions are free text
        assert!(requirement("Rank", Some("solo: Gold | duo: Plat")).is_ok());
    }

    #[test]
    fn test_requirement_set_rejects_case_insensitive_duplicates() {
        assert!(requirement_set(&reqs(&["Rank", "Timezone"])).is_ok());
        assert!(requirement_set(&reqs(&["Rank", "rank"])).is_err());
        assert!(requirement_set(&reqs(&["a", "b", "c", "d", "e", "f"])).is_err());
    }

    #[test]
    fn test_answers_follow_requirement_order() {
        let requirements = reqs(&["Rank", "Timezone"]);
        let answers = answers(
            &requirements,
            &responses(&[("timezone", "EST"), ("Rank", "Gold")]),
        )
        .unwrap();

        assert_eq!(
            answers,
            vec![
                Answer {
                    requirement: "Rank".to_string(),
                    answer: "Gold".to_string()
                },
                Answer {
                    requirement: "Timezone".to_string(),
                    answer: "EST".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_answers_must_match_exactly() {
        let requirements = reqs(&["Rank", "Timezone"]);

        // Missing key
        assert!(answers(&requirements, &responses(&[("Rank", "Gold")])).is_err());
        // Extra key
        assert!(answers(
            &requirements,
            &responses(&[("Rank", "Gold"), ("Timezone", "EST"), ("Agent", "Sage")])
        )
        .is_err());
        // Same requirement twice under different case
        assert!(answers(
            &requirements,
            &responses(&[("Rank", "Gold"), ("rank", "Silver"), ("Timezone", "EST")])
        )
        .is_err());
        // Blank answer
        assert!(answers(
            &requirements,
            &responses(&[("Rank", "  "), ("Timezone", "EST")])
        )
        .is_err());
    }
}
