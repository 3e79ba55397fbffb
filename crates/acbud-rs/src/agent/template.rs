//! Seed prompt templates.
//!
//! A [`TemplateSet`] bundles the three pieces of fixed text a conversation
//! needs: the seed instruction template, the compression preamble, and the
//! system role sent with every model call. The built-in
//! [`TemplateSet::accountability`] set is the default.
//!
//! Seed templates use `{placeholder}` substitution. `{goal}`, `{outcome}` and
//! `{obstacles}` are mandatory; `{plan}`, `{timeline}`, `{history}` and
//! `{name}` are filled when present.

use chrono::{DateTime, Utc};

use crate::agent::state::{JourneyRecord, render_plan_steps};
use crate::context::compression::COMPRESSION_PREAMBLE;
use crate::error::ValidationError;

/// System role sent with every model call.
pub const DEFAULT_SYSTEM_ROLE: &str =
    "You are an expert in facilitating conversations for an accountability buddy.";

/// Rendered in place of an empty plan so the model proposes one.
pub const EMPTY_PLAN_HINT: &str = "<if empty, suggest plans>";

const REQUIRED_PLACEHOLDERS: [&str; 3] = ["{goal}", "{outcome}", "{obstacles}"];

const ACCOUNTABILITY_SEED: &str = "\
You are an AI accountability buddy designed to help users achieve their health and wellbeing goals. Your role is to provide support, guidance, and personalized recommendations based on the user's input and progress. You will be working with the following information:

<context_variables>
wish/goal: {goal}
outcome/visualization/motivation: {outcome}
obstacles: {obstacles}
plan: {plan}
</context_variables>

These context variables include:
- wish/goal: The user's primary goal or wish
- outcome/visualization/motivation: The user's desired outcome, visualization, or motivation
- obstacles: Potential challenges or obstacles in the way of achieving the goal
- plan: Approved actionable steps to achieve the goal

<timeline>{timeline}</timeline>

The timeline variable contains:
- Time and date information for the most recent updates to context variables
- Current time and date

<cumulative_history>{history}</cumulative_history>

The cumulative history variable contains:
- Historical data on the effectiveness of previous plans
- Structured as: time/date, \"if I see this (obstacle) I will do this (plan)\", and corresponding effectiveness

When interacting with the user, follow these guidelines:

1. Initial interaction:
   - If any context variables are empty, ask the user to provide the missing information.
   - Use this format for requesting information:
     <request_info>
     [Specific question about missing context variable]
     </request_info>

2. Follow-up interaction:
   - Ask questions about the user's progress and any changes in their context.
   - Use this format for follow-up questions:
     <follow_up>
     [Specific question about progress or changes]
     </follow_up>

3. Updating context variables:
   - Based on the user's responses, update the context variables.
   - Use this format to confirm updates:
     <context_update>
     [Summary of updated context variables]
     </context_update>

4. Suggesting and approving plans:
   - Suggest small, actionable steps based on the user's goal and obstacles.
   - Use this format for suggestions:
     <suggested_plan>
     [List of actionable steps]
     </suggested_plan>
   - Allow the user to modify and approve the plan.
   - Once approved, update the plan context variable.

5. Handling disconnected timelines:
   - If the goal variable is updated but other variables are not, identify this issue in your next interaction.
   - Use this format to request updates:
     <timeline_update_request>
     I noticed that your goal has been updated, but other variables need to be aligned. Please provide updates for [list missing updates].
     </timeline_update_request>

6. Analyzing historical progression:
   - Use the cumulative history to recommend personalized, improved plans.
   - Consider what has and hasn't worked for the user in the past.
   - Use this format for personalized recommendations:
     <personalized_recommendation>
     Based on your history, I suggest: [Recommendation]
     This is because: [Explanation based on past effectiveness]
     </personalized_recommendation>

7. Maintaining a positive focus:
   - Always use encouraging language and focus on progress towards health and wellbeing goals.
   - Frame challenges as opportunities for growth.

8. Proactive messaging:
   - When the app is opened, assume the user wants to engage with their accountability buddy.
   - Use this format for proactive follow-up:
     <proactive_followup>
     Welcome back, <name>{name}</name>! [Personalized question or encouragement based on their goal and recent progress]
     </proactive_followup>";

/// A custom seed template lacked a mandatory placeholder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("seed template is missing placeholder(s): {}", .missing.join(", "))]
pub struct TemplateError {
    pub missing: Vec<&'static str>,
}

/// Seed template, compression preamble and system role for one kind of
/// conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    seed: String,
    compression_preamble: String,
    system_role: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::accountability()
    }
}

impl TemplateSet {
    /// The built-in health and wellbeing accountability buddy.
    pub fn accountability() -> Self {
        Self {
            seed: ACCOUNTABILITY_SEED.into(),
            compression_preamble: COMPRESSION_PREAMBLE.into(),
            system_role: DEFAULT_SYSTEM_ROLE.into(),
        }
    }

    /// Replace the seed template. Fails if a mandatory placeholder is absent.
    pub fn with_seed_template(mut self, seed: impl Into<String>) -> Result<Self, TemplateError> {
        let seed = seed.into();
        let missing: Vec<&'static str> = REQUIRED_PLACEHOLDERS
            .into_iter()
            .filter(|p| !seed.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError { missing });
        }
        self.seed = seed;
        Ok(self)
    }

    pub fn with_compression_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.compression_preamble = preamble.into();
        self
    }

    pub fn with_system_role(mut self, role: impl Into<String>) -> Self {
        self.system_role = role.into();
        self
    }

    pub fn seed_template(&self) -> &str {
        &self.seed
    }

    pub fn compression_preamble(&self) -> &str {
        &self.compression_preamble
    }

    pub fn system_role(&self) -> &str {
        &self.system_role
    }

    /// Fill the seed template from a journey record.
    ///
    /// Fails with every missing required variable before any substitution.
    pub fn render_seed(
        &self,
        journey: &JourneyRecord,
        now: DateTime<Utc>,
    ) -> Result<String, ValidationError> {
        let vars = &journey.variables;
        vars.validate()?;

        let plan = if vars.plans.is_empty() {
            EMPTY_PLAN_HINT.to_string()
        } else {
            format!("\n{}", render_plan_steps(&vars.plans))
        };
        let timeline = wrap_block(&journey.timeline.render(now, vars.name.as_deref()));
        let history = wrap_block(&journey.history.render());

        Ok(self
            .seed
            .replace("{goal}", vars.goal.trim())
            .replace("{outcome}", vars.outcome.trim())
            .replace("{obstacles}", vars.obstacles.trim())
            .replace("{plan}", &plan)
            .replace("{timeline}", &timeline)
            .replace("{history}", &history)
            .replace("{name}", vars.name.as_deref().unwrap_or_default()))
    }
}

/// Multi-line block bodies sit on their own lines; empty bodies collapse to
/// an empty tag pair.
fn wrap_block(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("\n{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{
        ContextField, ContextVariables, Effectiveness, HistoryEntry, JourneyRecord,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 15, 14, 30, 0).unwrap()
    }

    fn journey(vars: ContextVariables) -> JourneyRecord {
        JourneyRecord::new(vars, now())
    }

    #[test]
    fn renders_variables_and_empty_plan_hint() {
        let seed = TemplateSet::default()
            .render_seed(
                &journey(ContextVariables::new("Run a 5K", "Feel energetic", "No time")),
                now(),
            )
            .unwrap();

        assert!(seed.contains("wish/goal: Run a 5K\n"));
        assert!(seed.contains("outcome/visualization/motivation: Feel energetic\n"));
        assert!(seed.contains("obstacles: No time\n"));
        assert!(seed.contains("plan: <if empty, suggest plans>\n"));
        assert!(seed.contains("<cumulative_history></cumulative_history>"));
        assert!(seed.contains("Current time and date: 2023-05-15 14:30:00"));
        assert!(seed.contains("Welcome back, <name></name>!"));
        assert!(!seed.contains('{'));
    }

    #[test]
    fn renders_plans_as_numbered_list() {
        let vars = ContextVariables::new("g", "o", "x")
            .with_plans(vec!["Walk".into(), "Stretch".into()])
            .with_name("Sarah");
        let seed = TemplateSet::default()
            .render_seed(&journey(vars), now())
            .unwrap();

        assert!(seed.contains("plan: \n1. Walk\n2. Stretch\n</context_variables>"));
        assert!(seed.contains("User's name: Sarah"));
        assert!(seed.contains("Welcome back, <name>Sarah</name>!"));
    }

    #[test]
    fn renders_history_block() {
        let mut record = journey(ContextVariables::new("g", "o", "x"));
        record.history.push(HistoryEntry {
            recorded_at: now(),
            obstacle: "late-night cravings".into(),
            plan: "drink herbal tea".into(),
            effectiveness: Effectiveness::Moderate,
        });
        let seed = TemplateSet::default().render_seed(&record, now()).unwrap();
        assert!(seed.contains(
            "<cumulative_history>\n2023-05-15, \"If I see late-night cravings, I will drink herbal tea\", effectiveness: moderate\n</cumulative_history>"
        ));
    }

    #[test]
    fn missing_fields_fail_before_rendering() {
        let err = TemplateSet::default()
            .render_seed(&journey(ContextVariables::new("", "o", " ")), now())
            .unwrap_err();
        assert_eq!(err.missing, vec![ContextField::Goal, ContextField::Obstacles]);
    }

    #[test]
    fn custom_seed_requires_core_placeholders() {
        let err = TemplateSet::default()
            .with_seed_template("Goal: {goal}")
            .unwrap_err();
        assert_eq!(err.missing, vec!["{outcome}", "{obstacles}"]);

        let set = TemplateSet::default()
            .with_seed_template("G={goal} O={outcome} X={obstacles} P={plan}")
            .unwrap();
        let seed = set
            .render_seed(&journey(ContextVariables::new("a", "b", "c")), now())
            .unwrap();
        assert_eq!(seed, "G=a O=b X=c P=<if empty, suggest plans>");
    }

    #[test]
    fn default_set_carries_system_role_and_preamble() {
        let set = TemplateSet::default();
        assert_eq!(set.system_role(), DEFAULT_SYSTEM_ROLE);
        assert!(set.compression_preamble().starts_with("<prompt>"));
    }
}
