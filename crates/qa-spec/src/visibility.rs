use crate::context::Context;
use crate::spec::{DemographicField, QuestionSpec, QuestionnaireDefinition, Section};

/// `display_if` absent means always visible; otherwise the rule must hold.
pub fn is_visible(question: &QuestionSpec, ctx: &Context) -> bool {
    question
        .display_if
        .as_ref()
        .is_none_or(|rule| rule.holds(ctx))
}

/// `required_if`, when present, replaces the static `required` flag.
pub fn is_required(question: &QuestionSpec, ctx: &Context) -> bool {
    match &question.required_if {
        Some(rule) => rule.holds(ctx),
        None => question.required,
    }
}

/// A visible item and whether it must be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub id: String,
    pub required: bool,
}

/// Visible items in definition order. Hidden items are absent, so their
/// required flag never counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    items: Vec<ResolvedItem>,
}

impl Resolution {
    pub fn items(&self) -> &[ResolvedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    pub fn is_required(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id && item.required)
    }

    pub fn visible_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.id.as_str())
    }

    pub fn required_ids(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.required)
            .map(|item| item.id.as_str())
    }
}

pub fn resolve_questions(questions: &[QuestionSpec], ctx: &Context) -> Resolution {
    let items = questions
        .iter()
        .filter(|question| is_visible(question, ctx))
        .map(|question| ResolvedItem {
            id: question.id.clone(),
            required: is_required(question, ctx),
        })
        .collect();
    Resolution { items }
}

/// Demographic fields carry no rules: all are shown and their static flag applies.
pub fn resolve_fields(fields: &[DemographicField]) -> Resolution {
    let items = fields
        .iter()
        .map(|field| ResolvedItem {
            id: field.id.clone(),
            required: field.required,
        })
        .collect();
    Resolution { items }
}

/// Visible questions of `section`, in section order. Falls back to the
/// questions' own `section_id` when the section lists no ids.
pub fn visible_in_section<'a>(
    definition: &'a QuestionnaireDefinition,
    resolution: &Resolution,
    section: &'a Section,
) -> Vec<&'a QuestionSpec> {
    if section.question_ids.is_empty() {
        definition
            .questions
            .iter()
            .filter(|question| question.section_id.as_deref() == Some(section.id.as_str()))
            .filter(|question| resolution.is_visible(&question.id))
            .collect()
    } else {
        definition
            .section_questions(section)
            .filter(|question| resolution.is_visible(&question.id))
            .collect()
    }
}

/// Visible questions no section claims.
pub fn visible_unsectioned<'a>(
    definition: &'a QuestionnaireDefinition,
    resolution: &Resolution,
) -> Vec<&'a QuestionSpec> {
    definition
        .questions
        .iter()
        .filter(|question| resolution.is_visible(&question.id))
        .filter(|question| {
            !definition.sections.iter().any(|section| {
                section.question_ids.contains(&question.id)
                    || question.section_id.as_deref() == Some(section.id.as_str())
            })
        })
        .collect()
}
