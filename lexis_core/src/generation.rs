//! Quiz content generation.
//!
//! Every card is quizzed with a contextual sentence and a four-way
//! multiple-choice question. Content comes from a [`ContentGenerator`]:
//! either an external command (typically wrapping a language model) whose
//! reply is schema-checked by [`parse_mcq`], or the offline
//! [`CatalogQuizBuilder`] that assembles a quiz from catalog definitions.
//!
//! A failed or malformed generation is an [`Error::Generation`]; the driver
//! decides whether to skip the card or retry.

use crate::types::Flashcard;
use crate::{Error, Lexicon, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::process::{Command, Stdio};

/// Number of answer choices in a quiz
pub const OPTION_COUNT: usize = 4;

/// What the generator is asked for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizRequest {
    pub word: String,
    pub definition: String,
    /// Known items the sentence may work in for incidental review
    pub review_words: Vec<String>,
}

impl QuizRequest {
    pub fn for_card(card: &Flashcard, review_words: Vec<String>) -> Self {
        Self {
            word: card.word.clone(),
            definition: card.primary_definition().to_string(),
            review_words,
        }
    }
}

/// A validated multiple-choice quiz
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mcq {
    pub sentence: String,
    pub question: String,
    pub options: [String; OPTION_COUNT],
    pub answer_index: usize,
}

impl Mcq {
    pub fn correct_option(&self) -> &str {
        &self.options[self.answer_index]
    }
}

/// Source of quiz content
pub trait ContentGenerator {
    fn generate(&mut self, request: &QuizRequest) -> Result<Mcq>;
}

/// Wire shape of a generated reply, before validation
#[derive(Debug, Deserialize)]
struct RawMcq {
    sentence: Option<String>,
    question: Option<String>,
    options: Option<Vec<String>>,
    #[serde(alias = "answerIndex")]
    answer_index: Option<i64>,
}

/// Strip a surrounding markdown code fence, if any
fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(Error::Generation(format!("'{}' is empty", field))),
        None => Err(Error::Generation(format!("missing '{}'", field))),
    }
}

/// Validate a generator reply
///
/// The reply must be a JSON object with a non-empty `sentence` and
/// `question`, exactly four non-empty `options`, and an `answer_index`
/// (or `answerIndex`) pointing at one of them.
pub fn parse_mcq(raw: &str) -> Result<Mcq> {
    let body = unfence(raw);
    if body.is_empty() {
        return Err(Error::Generation("empty reply".into()));
    }

    let parsed: RawMcq = serde_json::from_str(body)
        .map_err(|e| Error::Generation(format!("reply is not a quiz object: {}", e)))?;

    let sentence = required_text(parsed.sentence, "sentence")?;
    let question = required_text(parsed.question, "question")?;

    let options = parsed
        .options
        .ok_or_else(|| Error::Generation("missing 'options'".into()))?;
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err(Error::Generation("an option is empty".into()));
    }
    let options: [String; OPTION_COUNT] = options.try_into().map_err(|v: Vec<String>| {
        Error::Generation(format!(
            "expected {} options, got {}",
            OPTION_COUNT,
            v.len()
        ))
    })?;

    let answer_index = parsed
        .answer_index
        .ok_or_else(|| Error::Generation("missing 'answer_index'".into()))?;
    if !(0..OPTION_COUNT as i64).contains(&answer_index) {
        return Err(Error::Generation(format!(
            "answer_index {} out of range",
            answer_index
        )));
    }

    Ok(Mcq {
        sentence,
        question,
        options,
        answer_index: answer_index as usize,
    })
}

/// Prompt sent to an external generator
pub fn build_prompt(request: &QuizRequest) -> String {
    let mut prompt = format!(
        "Generate a contextual sentence in natural Chinese that clearly demonstrates \
         the meaning of the word '{}' ({}).\n",
        request.word, request.definition
    );

    if !request.review_words.is_empty() {
        prompt.push_str(
            "Also, if it can be done naturally and fluently, try to incorporate one or \
             more of the following review words: ",
        );
        prompt.push_str(&request.review_words.join(", "));
        prompt.push_str(".\n");
    }

    prompt.push_str(&format!(
        "Then generate 4 English answer choices for what the word means, with only ONE \
         correct answer and 3 plausible distractors.\n\n\
         Respond with JSON only, in this format:\n\
         {{\n  \"sentence\": \"...\",\n  \"question\": \"What does the word '{}' most likely \
         mean in this sentence?\",\n  \"options\": [\"...\", \"...\", \"...\", \"...\"],\n  \
         \"answer_index\": 0\n}}\n",
        request.word
    ));
    prompt
}

/// Runs an external program: prompt on stdin, quiz JSON on stdout
#[derive(Clone, Debug)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    /// Build from a `[program, args...]` list
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("generator command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl ContentGenerator for CommandGenerator {
    fn generate(&mut self, request: &QuizRequest) -> Result<Mcq> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Generation(format!("cannot run '{}': {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator may exit without reading; its status decides the outcome
            if let Err(e) = stdin.write_all(build_prompt(request).as_bytes()) {
                tracing::debug!("Generator closed stdin early: {}", e);
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(Error::Generation(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let reply = String::from_utf8_lossy(&output.stdout);
        tracing::debug!("Generator replied {} bytes for '{}'", reply.len(), request.word);
        parse_mcq(&reply)
    }
}

/// Offline quizzes from catalog definitions
///
/// The correct definition is mixed with three definitions of other items.
/// The "sentence" is the word followed by any review words, separated by
/// ASCII punctuation only. No other text goes in, so a sentence scan can
/// only ever find the items that were actually shown.
pub struct CatalogQuizBuilder<'a, R> {
    lexicon: &'a Lexicon,
    rng: R,
}

impl<'a, R: Rng> CatalogQuizBuilder<'a, R> {
    pub fn new(lexicon: &'a Lexicon, rng: R) -> Self {
        Self { lexicon, rng }
    }
}

impl<'a, R: Rng> ContentGenerator for CatalogQuizBuilder<'a, R> {
    fn generate(&mut self, request: &QuizRequest) -> Result<Mcq> {
        let correct = request.definition.clone();

        let pool: Vec<&String> = self
            .lexicon
            .items
            .iter()
            .filter(|(id, _)| **id != request.word)
            .filter_map(|(_, item)| item.definitions.first())
            .filter(|d| **d != correct && !d.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if pool.len() < OPTION_COUNT - 1 {
            return Err(Error::Generation(format!(
                "only {} distractor definitions available for '{}'",
                pool.len(),
                request.word
            )));
        }

        let mut choices: Vec<String> = pool
            .choose_multiple(&mut self.rng, OPTION_COUNT - 1)
            .map(|d| (*d).clone())
            .collect();
        choices.push(correct.clone());
        choices.shuffle(&mut self.rng);

        let answer_index = choices
            .iter()
            .position(|c| *c == correct)
            .ok_or_else(|| Error::Generation("correct option lost".into()))?;
        let options: [String; OPTION_COUNT] = choices
            .try_into()
            .map_err(|_| Error::Generation("wrong option count".into()))?;

        let sentence = std::iter::once(&request.word)
            .chain(&request.review_words)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" / ");

        Ok(Mcq {
            sentence,
            question: format!("What does the word '{}' most likely mean?", request.word),
            options,
            answer_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LexicalItem;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn request(word: &str, definition: &str) -> QuizRequest {
        QuizRequest {
            word: word.into(),
            definition: definition.into(),
            review_words: vec![],
        }
    }

    fn lexicon(entries: &[(&str, &str)]) -> Lexicon {
        let items = entries
            .iter()
            .map(|(id, def)| {
                (
                    id.to_string(),
                    LexicalItem {
                        definitions: vec![def.to_string()],
                        ..Default::default()
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        Lexicon::new(items)
    }

    #[test]
    fn test_parse_valid_reply() {
        let raw = r#"{
            "sentence": "我很喜欢这个主意。",
            "question": "What does the word '喜欢' most likely mean in this sentence?",
            "options": ["to hate", "to like", "to eat", "to sleep"],
            "answer_index": 1
        }"#;

        let mcq = parse_mcq(raw).unwrap();
        assert_eq!(mcq.answer_index, 1);
        assert_eq!(mcq.correct_option(), "to like");
    }

    #[test]
    fn test_parse_accepts_fenced_camel_case() {
        let raw = "```json\n{\"sentence\": \"s\", \"question\": \"q\", \
                   \"options\": [\"a\", \"b\", \"c\", \"d\"], \"answerIndex\": 3}\n```";
        let mcq = parse_mcq(raw).unwrap();
        assert_eq!(mcq.correct_option(), "d");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        let cases = [
            "",
            "not json at all",
            "print('hello')",
            r#"{"question": "q", "options": ["a","b","c","d"], "answer_index": 0}"#,
            r#"{"sentence": "s", "question": "q", "options": ["a","b","c"], "answer_index": 0}"#,
            r#"{"sentence": "s", "question": "q", "options": ["a","b","c","d"], "answer_index": 4}"#,
            r#"{"sentence": "s", "question": "q", "options": ["a","b","c","d"], "answer_index": -1}"#,
            r#"{"sentence": "s", "question": "q", "options": ["a","","c","d"], "answer_index": 0}"#,
            r#"{"sentence": "s", "question": "q", "options": ["a","b","c","d"]}"#,
            r#"["s", "q"]"#,
        ];

        for raw in cases {
            assert!(
                matches!(parse_mcq(raw), Err(Error::Generation(_))),
                "accepted: {}",
                raw
            );
        }
    }

    #[test]
    fn test_prompt_mentions_review_words() {
        let mut req = request("喜欢", "to like");
        assert!(!build_prompt(&req).contains("review words"));

        req.review_words = vec!["咖啡".into(), "茶".into()];
        let prompt = build_prompt(&req);
        assert!(prompt.contains("'喜欢' (to like)"));
        assert!(prompt.contains("咖啡, 茶"));
        assert!(prompt.contains("\"answer_index\": 0"));
    }

    #[test]
    fn test_catalog_builder_includes_correct_answer() {
        let lexicon = lexicon(&[
            ("喜欢", "to like"),
            ("吃", "to eat"),
            ("喝", "to drink"),
            ("睡觉", "to sleep"),
            ("看", "to look"),
        ]);
        let mut builder = CatalogQuizBuilder::new(&lexicon, StdRng::seed_from_u64(7));

        for _ in 0..20 {
            let mcq = builder.generate(&request("喜欢", "to like")).unwrap();
            assert_eq!(mcq.correct_option(), "to like");
            let distinct: BTreeSet<_> = mcq.options.iter().collect();
            assert_eq!(distinct.len(), OPTION_COUNT);
        }
    }

    #[test]
    fn test_catalog_builder_sentence_carries_review_words() {
        let lexicon = lexicon(&[("一", "one"), ("二", "two"), ("三", "three"), ("四", "four")]);
        let mut builder = CatalogQuizBuilder::new(&lexicon, StdRng::seed_from_u64(1));
        let mut req = request("一", "one");
        req.review_words = vec!["三".into(), "四".into()];

        let mcq = builder.generate(&req).unwrap();
        assert_eq!(mcq.sentence, "一 / 三 / 四");

        let mcq = builder.generate(&request("二", "two")).unwrap();
        assert_eq!(mcq.sentence, "二");
    }

    #[test]
    fn test_catalog_builder_needs_three_distractors() {
        let lexicon = lexicon(&[("一", "one"), ("二", "two"), ("三", "one")]);
        let mut builder = CatalogQuizBuilder::new(&lexicon, StdRng::seed_from_u64(1));

        let result = builder.generate(&request("一", "one"));
        assert!(matches!(result, Err(Error::Generation(_))));
    }

    #[test]
    fn test_command_generator_requires_program() {
        assert!(matches!(CommandGenerator::new(&[]), Err(Error::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_validates_output() {
        let ok = vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"cat > /dev/null; echo '{"sentence":"s","question":"q","options":["a","b","c","d"],"answer_index":2}'"#
                .to_string(),
        ];
        let mcq = CommandGenerator::new(&ok)
            .unwrap()
            .generate(&request("一", "one"))
            .unwrap();
        assert_eq!(mcq.correct_option(), "c");

        let garbage = vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat > /dev/null; echo 'sorry, I cannot help'".to_string(),
        ];
        let result = CommandGenerator::new(&garbage)
            .unwrap()
            .generate(&request("一", "one"));
        assert!(matches!(result, Err(Error::Generation(_))));

        let failing = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let result = CommandGenerator::new(&failing)
            .unwrap()
            .generate(&request("一", "one"));
        assert!(matches!(result, Err(Error::Generation(_))));
    }
}
