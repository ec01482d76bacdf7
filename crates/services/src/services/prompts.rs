//! Prompt templates for case generation, reference solutions and grading.

use std::fmt::Write;

use db::models::skill::SkillWithLevels;

use super::embeddings::RetrievedChunk;

pub const CASE_SYSTEM: &str = "You write realistic case studies for skill assessments in higher education. \
You always answer with a single JSON object and nothing else.";

pub const SOLUTION_SYSTEM: &str = "You are a subject-matter expert writing model answers for case-study assessments. \
Ground your answer in the provided excerpts where relevant. You always answer with a single JSON object and nothing else.";

pub const GRADING_SYSTEM: &str = "You are a fair, consistent examiner. You grade student answers against a skill rubric. \
You always answer with a single JSON object and nothing else.";

fn push_skills(prompt: &mut String, skills: &[SkillWithLevels]) {
    prompt.push_str("\n## Skills\n");
    for skill in skills {
        let _ = writeln!(prompt, "### {}", skill.name);
        if let Some(description) = skill.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(prompt, "{}", description.trim());
        }
        if !skill.levels.is_empty() {
            prompt.push_str("Levels, lowest to highest:\n");
            for level in &skill.levels {
                match level.description.as_deref().filter(|d| !d.trim().is_empty()) {
                    Some(description) => {
                        let _ = writeln!(prompt, "- \"{}\": {}", level.label, description.trim());
                    }
                    None => {
                        let _ = writeln!(prompt, "- \"{}\"", level.label);
                    }
                }
            }
        }
    }
}

fn push_excerpts(prompt: &mut String, excerpts: &[RetrievedChunk]) {
    if excerpts.is_empty() {
        return;
    }
    prompt.push_str("\n## Reference excerpts\n");
    for (i, excerpt) in excerpts.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {} (chunk {})\n{}\n", i + 1, excerpt.source_title, excerpt.chunk_index, excerpt.text.trim());
    }
}

/// Prompt asking for a new case study text
pub fn case_prompt(
    title: &str,
    domain: Option<&str>,
    skills: &[SkillWithLevels],
    instructions: Option<&str>,
    excerpts: &[RetrievedChunk],
) -> String {
    let mut prompt = format!("Write a case study for the assessment \"{}\".\n", title);
    if let Some(domain) = domain {
        let _ = writeln!(prompt, "Subject domain: {}", domain);
    }
    push_skills(&mut prompt, skills);
    if let Some(instructions) = instructions.filter(|i| !i.trim().is_empty()) {
        let _ = write!(prompt, "\n## Teacher instructions\n{}\n", instructions.trim());
    }
    push_excerpts(&mut prompt, excerpts);
    prompt.push_str(
        r#"
## Instructions
1. Describe a concrete, realistic situation that lets a student demonstrate every skill listed above
2. End with the questions or tasks the student must address
3. Do not include the answer

## Output Format
Return ONLY valid JSON with this structure:
```json
{
  "case_text": "The full case study, in markdown"
}
```"#,
    );
    prompt
}

/// Prompt asking for a reference solution to an existing case
pub fn solution_prompt(case_text: &str, skills: &[SkillWithLevels], excerpts: &[RetrievedChunk]) -> String {
    let mut prompt = format!("Write the model solution for the following case study.\n\n## Case\n{}\n", case_text.trim());
    push_skills(&mut prompt, skills);
    push_excerpts(&mut prompt, excerpts);
    prompt.push_str(
        r#"
## Instructions
1. Answer every question in the case as a top-level student would
2. Cite excerpts by their number, e.g. [2], when you rely on them
3. Show the reasoning a grader should look for under each skill

## Output Format
Return ONLY valid JSON with this structure:
```json
{
  "solution": "The model solution, in markdown"
}
```"#,
    );
    prompt
}

/// Prompt asking for one level per skill for a student's answer
pub fn grading_prompt(
    case_text: &str,
    solution: Option<&str>,
    answer: &str,
    skills: &[SkillWithLevels],
) -> String {
    let mut prompt = format!("Grade the student answer below.\n\n## Case\n{}\n", case_text.trim());
    if let Some(solution) = solution.filter(|s| !s.trim().is_empty()) {
        let _ = write!(prompt, "\n## Reference solution\n{}\n", solution.trim());
    }
    let answer = answer.trim();
    let _ = write!(
        prompt,
        "\n## Student answer\n{}\n",
        if answer.is_empty() { "(no answer given)" } else { answer }
    );
    push_skills(&mut prompt, skills);
    prompt.push_str(
        r#"
## Instructions
1. Assess each skill independently
2. Pick exactly one level per skill, using the level label verbatim
3. Give short, specific feedback per skill and overall feedback addressed to the student

## Output Format
Return ONLY valid JSON with this structure:
```json
{
  "skills": [
    { "skill": "Skill name", "level": "Level label", "feedback": "Why this level" }
  ],
  "overall_feedback": "Summary for the student"
}
```"#,
    );
    prompt
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::{skill::Skill, skill_level::SkillLevel};
    use uuid::Uuid;

    use super::*;

    fn skill(name: &str, levels: &[&str]) -> SkillWithLevels {
        let id = Uuid::new_v4();
        SkillWithLevels {
            skill: Skill {
                id,
                domain_id: Uuid::new_v4(),
                name: name.to_string(),
                description: Some("Builds sound arguments".to_string()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            levels: levels
                .iter()
                .enumerate()
                .map(|(i, label)| SkillLevel {
                    id: Uuid::new_v4(),
                    skill_id: id,
                    label: label.to_string(),
                    description: None,
                    position: i as i64,
                })
                .collect(),
        }
    }

    #[test]
    fn test_grading_prompt_lists_levels_in_order() {
        let prompt = grading_prompt("Case", Some("Reference"), "  ", &[skill("Reasoning", &["Low", "High"])]);
        assert!(prompt.contains("## Reference solution\nReference"));
        assert!(prompt.contains("(no answer given)"));
        let low = prompt.find("- \"Low\"").unwrap();
        let high = prompt.find("- \"High\"").unwrap();
        assert!(low < high);
    }

    #[test]
    fn test_case_prompt_includes_excerpts_and_instructions() {
        let excerpts = [RetrievedChunk {
            source_id: Uuid::new_v4(),
            source_title: "Handbook".to_string(),
            chunk_index: 3,
            text: "Suppliers must be audited yearly.".to_string(),
            score: 0.9,
        }];
        let prompt = case_prompt("Audit", Some("Logistics"), &[], Some("Keep it short"), &excerpts);
        assert!(prompt.contains("Subject domain: Logistics"));
        assert!(prompt.contains("## Teacher instructions\nKeep it short"));
        assert!(prompt.contains("[1] Handbook (chunk 3)"));

        let bare = solution_prompt("Case", &[], &[]);
        assert!(!bare.contains("## Reference excerpts"));
    }
}
