//! Prompt templates for the scoring and structured-fetch calls.

/// Scoring prompt for one discovered link.
pub fn validation_prompt(topic: &str, url: &str, link_text: &str, url_path: &str) -> String {
    let hints = topic_hints(topic)
        .map(|h| format!("5. Valid {topic} news is often also about {h}\n"))
        .unwrap_or_default();

    format!(
        r#"You are an assistant that judges whether a link points to a genuine {topic} news article.

URL: {url}
Link text: {link_text}
URL path: {url_path}

Task: decide whether this link leads to a single {topic} news article and give it a score from 0 to 100.
Traits of a valid news article link:
1. It points to one specific article, not a homepage, section page or aggregation page
2. The URL path usually contains a date (e.g. /2023/04/02/) or an article identifier (e.g. /article-id-123)
3. The link text reads like a headline: short and descriptive, not a generic "click here"
4. The path is not a non-article path such as /tag/, /login/, /search/ or /category/
{hints}
Scoring:
- Matches all traits: 80-100
- Matches some (e.g. a headline but an unclear path): 50-79
- Does not match or cannot be judged: 0-49

Reply with exactly this JSON object and nothing else:
{{"score": <0-100>, "is_valid": true/false, "reason": "<short explanation>"}}
"#
    )
}

/// Instruction sent with the structured fetch.
pub fn extraction_prompt(topic: &str) -> String {
    format!(
        "Extract the complete content of this {topic} news article: title, body text, \
         publish date, source, category, author and a short summary."
    )
}

fn topic_hints(topic: &str) -> Option<&'static str> {
    match topic {
        "agricultural" | "agriculture" => Some(
            "weather, policy, agribusiness companies (such as JBS, Minerva or Marfrig), \
             trade flows and exchange rates",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_prompt_carries_link_details() {
        let prompt = validation_prompt(
            "agricultural",
            "https://farm.example/2024/05/01/soy-prices",
            "",
            "/2024/05/01/soy-prices",
        );

        assert!(prompt.contains("URL: https://farm.example/2024/05/01/soy-prices"));
        assert!(prompt.contains("URL path: /2024/05/01/soy-prices"));
        assert!(prompt.contains("Marfrig"));
        assert!(prompt.contains(r#"{"score": <0-100>"#));
    }

    #[test]
    fn test_other_topics_have_no_hint_line() {
        let prompt = validation_prompt("energy", "https://e.example/a", "", "/a");
        assert!(prompt.contains("genuine energy news article"));
        assert!(!prompt.contains("5. Valid"));
    }
}
