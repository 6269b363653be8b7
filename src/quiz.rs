use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera, Value};

/// One rendered question variant, ready for XML assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuestion {
    /// 1-based database row the variant was generated from
    pub row: usize,

    /// Question name shown in Moodle, derived from the template stem and
    /// the row number
    pub name: String,

    /// Substituted question text
    pub body: String,
}

impl RenderedQuestion {
    /// Creates a rendered question named after its source row.
    #[must_use]
    pub fn new(stem: &str, row: usize, body: String) -> Self {
        Self {
            row,
            name: format!("{stem}-{row:03}"),
            body,
        }
    }
}

#[derive(Serialize)]
struct QuizContext<'a> {
    question_count: usize,
    questions: Vec<QuestionView<'a>>,
    metadata: ContextMetadata,
}

#[derive(Serialize)]
struct QuestionView<'a> {
    name: &'a str,
    idnumber: usize,
    body: &'a str,
}

#[derive(Serialize)]
struct ContextMetadata {
    generated_at: String,
    template: String,
}

/// Assembles rendered questions into one Moodle quiz XML document.
pub(crate) struct QuizAssembler {
    tera: Tera,
}

impl QuizAssembler {
    /// Creates a new assembler with the built-in quiz template.
    ///
    /// # Errors
    ///
    /// Returns an error if template registration fails.
    pub(crate) fn new() -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_template("quiz", include_str!("../templates/quiz.tera"))
            .map_err(|e| Error::template("quiz", e))?;

        tera.register_filter("xml_escape", Self::xml_escape_filter);

        Ok(Self { tera })
    }

    /// XML escape filter implementation.
    fn xml_escape_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        if let Some(s) = value.as_str() {
            Ok(Value::String(crate::xml::escape_xml(s)))
        } else {
            Ok(value.clone())
        }
    }

    /// Renders the full quiz document for the given questions.
    ///
    /// Question order in the output equals slice order, which the pipeline
    /// keeps equal to database row order.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render(
        &self,
        template_name: &str,
        questions: &[RenderedQuestion],
    ) -> Result<String> {
        let views: Vec<QuestionView<'_>> = questions
            .iter()
            .map(|q| QuestionView {
                name: &q.name,
                idnumber: q.row,
                body: &q.body,
            })
            .collect();

        let context = QuizContext {
            question_count: views.len(),
            questions: views,
            metadata: ContextMetadata {
                generated_at: chrono::Local::now()
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                template: template_name.to_string(),
            },
        };

        let mut tera_context = Context::new();
        tera_context.insert("ctx", &context);

        self.tera
            .render("quiz", &tera_context)
            .map_err(|e| Error::template("quiz", e))
    }
}
