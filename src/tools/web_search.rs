use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, parse_args};
use crate::types::ToolDefinition;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Web lookups through DuckDuckGo's instant-answer API.
pub struct WebSearch {
    endpoint: String,
}

#[derive(Deserialize)]
struct Args {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    results: Vec<Topic>,
    related_topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Topic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<Topic>,
    },
}

struct Hit<'a> {
    title: &'a str,
    url: &'a str,
    body: &'a str,
}

impl WebSearch {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WebSearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web using DuckDuckGo. Use this to find current information, \
                news, facts, or anything that requires up-to-date knowledge."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (default 5)",
                        "default": 5
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn call(&self, input: &Value) -> anyhow::Result<String> {
        let args: Args = parse_args(input)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        let answer: InstantAnswer = client
            .get(&self.endpoint)
            .query(&[
                ("q", args.query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(format_answer(&answer, args.max_results))
    }
}

fn format_answer(answer: &InstantAnswer, max_results: usize) -> String {
    let mut hits = Vec::new();
    if !answer.abstract_text.is_empty() {
        hits.push(Hit {
            title: &answer.heading,
            url: &answer.abstract_url,
            body: &answer.abstract_text,
        });
    }
    collect(&answer.results, &mut hits);
    collect(&answer.related_topics, &mut hits);

    if hits.is_empty() {
        return "No results found.".to_string();
    }

    hits.iter()
        .take(max_results)
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.url, hit.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect<'a>(topics: &'a [Topic], hits: &mut Vec<Hit<'a>>) {
    for topic in topics {
        match topic {
            Topic::Entry { text, first_url } => {
                // Entries read "Title - description"; the title is the link text.
                let (title, body) = text.split_once(" - ").unwrap_or((text.as_str(), text.as_str()));
                hits.push(Hit {
                    title,
                    url: first_url,
                    body,
                });
            }
            Topic::Group { topics } => collect(topics, hits),
        }
    }
}
