//! `{variable}` substitution for notification text and email templates.

use serde::Serialize;

use crate::project::{format_cents, ProjectState};

/// Variables a template may reference.
pub const TEMPLATE_VARIABLES: &[&str] = &[
    "client_name",
    "project_name",
    "stage",
    "stage_number",
    "budget",
    "deadline",
    "notes",
];

/// Values substituted into a template. Missing values render as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateContext {
    pub client_name: String,
    pub project_name: String,
    pub stage: String,
    pub stage_number: String,
    pub budget: String,
    pub deadline: String,
    pub notes: String,
}

impl TemplateContext {
    pub fn for_project(project: &ProjectState) -> Self {
        Self {
            client_name: project.client_name.clone().unwrap_or_default(),
            project_name: project.title.clone(),
            stage: project.current_stage.clone(),
            stage_number: project.stage_number.to_string(),
            budget: project.budget_cents.map(format_cents).unwrap_or_default(),
            deadline: project
                .deadline
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            notes: project.notes.clone().unwrap_or_default(),
        }
    }

    fn value(&self, name: &str) -> &str {
        match name {
            "client_name" => &self.client_name,
            "project_name" => &self.project_name,
            "stage" => &self.stage,
            "stage_number" => &self.stage_number,
            "budget" => &self.budget,
            "deadline" => &self.deadline,
            "notes" => &self.notes,
            _ => "",
        }
    }
}

/// Replace every known `{variable}` in `template`. Unknown placeholders are
/// left as written.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    let mut out = template.to_string();
    for name in TEMPLATE_VARIABLES {
        let placeholder = format!("{{{name}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, ctx.value(name));
        }
    }
    out
}
