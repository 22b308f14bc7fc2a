use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::llm::{Answer, RagError};

pub const EMPTY_ANSWER_WARNING: &str = "Please enter the questions related to the given paper";

/// What the page shows below the question form.
#[derive(Debug)]
pub enum Outcome {
    Warning(String),
    Solution(Answer),
    Failure(String),
}

impl Outcome {
    /// Maps a chain result onto the message the page displays.
    pub fn from_result(result: Result<Answer, RagError>) -> Self {
        match result {
            Ok(answer) if answer.is_empty() => Outcome::Warning(EMPTY_ANSWER_WARNING.to_string()),
            Ok(answer) => Outcome::Solution(answer),
            Err(RagError::EmptyQuestion) => Outcome::Warning(RagError::EmptyQuestion.to_string()),
            Err(e) => Outcome::Failure(format!("Error occurred: {}", e)),
        }
    }
}

const STYLE: &str = "body{font-family:sans-serif;max-width:46rem;margin:3rem auto;padding:0 1rem;color:#262730}\
h1{font-size:2rem}h2{color:#555;font-weight:400;font-size:1.15rem}\
input[type=text]{width:100%;padding:.5rem;font-size:1rem;box-sizing:border-box}\
button{margin-top:.75rem;padding:.4rem 1.2rem;font-size:1rem}\
.warning{background:#fffce7;border-left:4px solid #f0c000;padding:.75rem}\
.error{background:#ffecec;border-left:4px solid #e03030;padding:.75rem}\
.answer{white-space:pre-wrap;line-height:1.5}\
details{margin-top:1rem;color:#555;font-size:.9rem}";

pub fn render(title: &str, subtitle: &str, question: &str, outcome: Option<&Outcome>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", encode_text(title)));
    html.push_str(&format!("<style>{}</style>\n</head>\n<body>\n", STYLE));
    html.push_str(&format!("<h1>{}</h1>\n", encode_text(title)));
    html.push_str(&format!("<h2>{}</h2>\n", encode_text(subtitle)));
    html.push_str("<form method=\"post\" action=\"/\">\n");
    html.push_str(&format!(
        "<input type=\"text\" name=\"question\" placeholder=\"Enter your question here\" value=\"{}\">\n",
        encode_double_quoted_attribute(question)
    ));
    html.push_str("<button type=\"submit\">View</button>\n</form>\n");

    match outcome {
        Some(Outcome::Warning(message)) => {
            html.push_str(&format!("<p class=\"warning\">{}</p>\n", encode_text(message)));
        }
        Some(Outcome::Failure(message)) => {
            html.push_str(&format!("<p class=\"error\">{}</p>\n", encode_text(message)));
        }
        Some(Outcome::Solution(answer)) => {
            html.push_str("<h3>View solution :</h3>\n");
            html.push_str(&format!("<div class=\"answer\">{}</div>\n", encode_text(&answer.text)));
            if !answer.sources.is_empty() {
                html.push_str("<details><summary>Sources</summary><ul>\n");
                for source in &answer.sources {
                    html.push_str(&format!(
                        "<li>p.{} (score {:.3}): {}</li>\n",
                        source.page,
                        source.score,
                        encode_text(&source.excerpt)
                    ));
                }
                html.push_str("</ul></details>\n");
            }
        }
        None => {}
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SourceRef;
    use crate::providers::ProviderError;

    #[test]
    fn blank_form_has_title_field_and_button() {
        let html = render("Paper QA", "Ask away", "", None);
        assert!(html.contains("<h1>Paper QA</h1>"));
        assert!(html.contains("<h2>Ask away</h2>"));
        assert!(html.contains("name=\"question\""));
        assert!(html.contains(">View</button>"));
        assert!(!html.contains("View solution"));
    }

    #[test]
    fn answers_are_escaped() {
        let outcome = Outcome::Solution(Answer {
            text: "<script>alert(1)</script>".to_string(),
            sources: vec![SourceRef {
                page: 2,
                chunk_index: 0,
                score: 0.91,
                excerpt: "a < b".to_string(),
            }],
        });
        let html = render("t", "s", "\"quoted\"", Some(&outcome));
        assert!(html.contains("View solution :"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("value=\"&quot;quoted&quot;\""));
    }

    #[test]
    fn results_map_to_messages() {
        let empty = Outcome::from_result(Ok(Answer {
            text: String::new(),
            sources: Vec::new(),
        }));
        assert!(matches!(empty, Outcome::Warning(ref m) if m == EMPTY_ANSWER_WARNING));

        let blank = Outcome::from_result(Err(RagError::EmptyQuestion));
        assert!(matches!(blank, Outcome::Warning(ref m) if m == "Enter your query"));

        let failed = Outcome::from_result(Err(RagError::Provider(ProviderError::Blocked("SAFETY".to_string()))));
        assert!(matches!(failed, Outcome::Failure(ref m) if m.starts_with("Error occurred: ")));
    }
}
