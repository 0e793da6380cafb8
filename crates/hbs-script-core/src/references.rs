//! Compile-time check that a template only names helpers and partials that exist.
//!
//! Only references that are unambiguous in the source are checked:
//! - an expression, block or subexpression with params or hash arguments names a helper
//! - `{{> name}}` names a partial; `{{#> name}}..{{/name}}` has a fallback and is not checked
//!
//! A bare `{{name}}` may be a variable or a zero-argument helper, so it is resolved at
//! render time like everything else that depends on the variables.

use std::collections::HashSet;
use std::fmt;

use handlebars::template::{DecoratorTemplate, HelperTemplate, Parameter, TemplateElement};
use handlebars::{Handlebars, Template};
use serde_json::Value;

/// Helpers every Handlebars registry starts with.
pub const BUILTIN_HELPERS: &[&str] = &[
    "if", "unless", "each", "with", "lookup", "raw", "log", "eq", "ne", "gt", "gte", "lt",
    "lte", "and", "or", "not", "len",
];

/// Registering this helper makes every unknown helper call legal.
const HELPER_MISSING: &str = "helperMissing";

/// The first reference in a template that nothing resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    Helper(String),
    Partial(String),
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unresolved::Helper(name) => write!(f, "could not find helper '{name}'"),
            Unresolved::Partial(name) => write!(f, "could not find partial '{name}'"),
        }
    }
}

/// Find the first helper or partial `template` names that neither `helpers` (sorted),
/// the built-ins, `hbs`'s registered templates nor the template's own inline partials
/// provide.
pub fn find_unresolved(
    template: &Template,
    helpers: &[String],
    hbs: &Handlebars<'_>,
) -> Option<Unresolved> {
    let mut inline = HashSet::new();
    collect_inline(template, &mut inline);
    let check = Check {
        helpers,
        hbs,
        inline,
        any_helper: helpers.binary_search_by(|h| h.as_str().cmp(HELPER_MISSING)).is_ok(),
    };
    check.template(template)
}

struct Check<'a, 'reg> {
    helpers: &'a [String],
    hbs: &'a Handlebars<'reg>,
    inline: HashSet<String>,
    any_helper: bool,
}

impl Check<'_, '_> {
    fn is_helper(&self, name: &str) -> bool {
        self.any_helper
            || BUILTIN_HELPERS.contains(&name)
            || self.helpers.binary_search_by(|h| h.as_str().cmp(name)).is_ok()
    }

    fn is_partial(&self, name: &str) -> bool {
        self.inline.contains(name) || self.hbs.has_template(name)
    }

    fn template(&self, template: &Template) -> Option<Unresolved> {
        template.elements.iter().find_map(|e| self.element(e))
    }

    fn element(&self, element: &TemplateElement) -> Option<Unresolved> {
        match element {
            TemplateElement::Expression(ht)
            | TemplateElement::HtmlExpression(ht)
            | TemplateElement::HelperBlock(ht) => self.helper(ht),
            TemplateElement::PartialExpression(dt) => self.partial(dt, false),
            TemplateElement::PartialBlock(dt) => self.partial(dt, true),
            TemplateElement::DecoratorExpression(dt) | TemplateElement::DecoratorBlock(dt) => {
                self.nested(&dt.params, dt.hash.values(), dt.template.as_ref())
            }
            _ => None,
        }
    }

    fn helper(&self, ht: &HelperTemplate) -> Option<Unresolved> {
        if !ht.params.is_empty() || !ht.hash.is_empty() {
            if let Some(name) = ht.name.as_name() {
                if !self.is_helper(name) {
                    return Some(Unresolved::Helper(name.to_string()));
                }
            }
        }
        self.nested(&ht.params, ht.hash.values(), ht.template.as_ref())
            .or_else(|| ht.inverse.as_ref().and_then(|t| self.template(t)))
    }

    fn partial(&self, dt: &DecoratorTemplate, has_fallback: bool) -> Option<Unresolved> {
        if !has_fallback {
            if let Some(name) = static_name(&dt.name) {
                if !name.starts_with('@') && !self.is_partial(name) {
                    return Some(Unresolved::Partial(name.to_string()));
                }
            }
        }
        self.nested(&dt.params, dt.hash.values(), dt.template.as_ref())
    }

    fn nested<'p>(
        &self,
        params: &'p [Parameter],
        hash: impl Iterator<Item = &'p Parameter>,
        body: Option<&Template>,
    ) -> Option<Unresolved> {
        params
            .iter()
            .chain(hash)
            .find_map(|p| match p {
                Parameter::Subexpression(sub) => self.element(sub.as_element()),
                _ => None,
            })
            .or_else(|| body.and_then(|t| self.template(t)))
    }
}

/// A partial name written literally in the source; dynamic `(expr)` names are skipped.
fn static_name(name: &Parameter) -> Option<&str> {
    match name {
        Parameter::Literal(Value::String(s)) => Some(s),
        Parameter::Subexpression(_) => None,
        other => other.as_name(),
    }
}

/// Names declared with `{{#*inline "name"}}` anywhere in the template.
fn collect_inline(template: &Template, names: &mut HashSet<String>) {
    for element in &template.elements {
        match element {
            TemplateElement::DecoratorBlock(dt) => {
                if dt.name.as_name() == Some("inline") {
                    if let Some(Parameter::Literal(Value::String(name))) = dt.params.first() {
                        names.insert(name.clone());
                    }
                }
                if let Some(body) = &dt.template {
                    collect_inline(body, names);
                }
            }
            TemplateElement::HelperBlock(ht) => {
                for body in ht.template.iter().chain(ht.inverse.iter()) {
                    collect_inline(body, names);
                }
            }
            TemplateElement::PartialBlock(dt) => {
                if let Some(body) = &dt.template {
                    collect_inline(body, names);
                }
            }
            _ => {}
        }
    }
}
