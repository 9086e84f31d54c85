//! Study session driver.
//!
//! A [`StudySession`] owns everything that lives for one day's study pass:
//! the queue of items to present and the card currently on screen. The
//! caller keeps the session value and hands in the catalog and progress
//! store on each call, so nothing about "the current item" is global.
//!
//! Typical flow:
//! 1. [`StudySession::plan`] runs the lottery, seeds new items, queues due
//!    items followed by refreshers
//! 2. [`StudySession::next_card`] pops an item and builds its flashcard
//! 3. the caller generates a quiz and [`StudySession::attach_quiz`]es it
//! 4. [`StudySession::check_answer`] grades the multiple-choice answer
//! 5. [`StudySession::record_score`] applies the recall score, plus passive
//!    reviews for known items in the quiz sentence
//!
//! An item is credited at most once per session. Items still waiting in the
//! queue get their own active review, so a sentence mentioning them does not
//! also move their schedule.

use crate::catalog::build_flashcard;
use crate::config::ScheduleConfig;
use crate::generation::{Mcq, QuizRequest};
use crate::lottery::{seed_new_items, select_new_items};
use crate::scheduler::{due_items, passive_review_sentence, update_active};
use crate::types::*;
use crate::{Error, Lexicon, Result};
use chrono::NaiveDate;
use rand::Rng;
use std::collections::{BTreeSet, VecDeque};

/// How many upcoming items are offered to the generator as review hints
pub const REVIEW_HINT_COUNT: usize = 3;

/// The card being studied and its quiz, once generated
#[derive(Clone, Debug)]
pub struct CurrentCard {
    pub card: Flashcard,
    pub quiz: Option<Mcq>,
}

/// Result of grading a multiple-choice answer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct { answer: String },
    Incorrect { chosen: String, answer: String },
}

impl AnswerOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, AnswerOutcome::Correct { .. })
    }
}

/// Everything a recall score changed
#[derive(Clone, Debug)]
pub struct ScoreOutcome {
    pub word: String,
    pub record: ProgressRecord,
    /// Items passively reviewed through the quiz sentence
    pub passive: Vec<String>,
    /// One active event followed by one per passive review
    pub events: Vec<ReviewEvent>,
}

/// One learner's study pass for one day
#[derive(Clone, Debug)]
pub struct StudySession {
    today: NaiveDate,
    queue: VecDeque<String>,
    current: Option<CurrentCard>,
    introduced: Vec<String>,
    /// Lottery picks presented even though they are not due
    refreshers: BTreeSet<String>,
    /// Items whose schedule already moved this session
    credited: BTreeSet<String>,
    completed: usize,
    skipped: usize,
}

impl StudySession {
    /// Run the lottery, seed new items, and queue today's work
    ///
    /// The queue holds every due item (new items are due the day they are
    /// seeded) followed by the lottery's refresher picks that are not due.
    pub fn plan<R: Rng + ?Sized>(
        lexicon: &Lexicon,
        store: &mut ProgressStore,
        config: &ScheduleConfig,
        today: NaiveDate,
        rng: &mut R,
    ) -> Self {
        let selection = select_new_items(lexicon, store, config, today, rng);
        let introduced = seed_new_items(store, &selection, today);

        let mut queue: VecDeque<String> = due_items(store, today).into();
        let mut refreshers = BTreeSet::new();
        for id in &selection.seen {
            if !queue.contains(id) {
                queue.push_back(id.clone());
                refreshers.insert(id.clone());
            }
        }

        tracing::info!(
            "Planned session for {}: {} new, {} queued",
            today,
            introduced.len(),
            queue.len()
        );

        Self {
            today,
            queue,
            current: None,
            introduced,
            refreshers,
            credited: BTreeSet::new(),
            completed: 0,
            skipped: 0,
        }
    }

    /// Session over an explicit queue, without running the lottery
    ///
    /// Only queued items that are due when their turn comes are presented.
    pub fn with_queue(today: NaiveDate, queue: Vec<String>) -> Self {
        Self {
            today,
            queue: queue.into(),
            current: None,
            introduced: Vec::new(),
            refreshers: BTreeSet::new(),
            credited: BTreeSet::new(),
            completed: 0,
            skipped: 0,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Items that received their first record during planning
    pub fn introduced(&self) -> &[String] {
        &self.introduced
    }

    pub fn queued(&self) -> impl Iterator<Item = &String> {
        self.queue.iter()
    }

    /// Items still waiting, not counting the current card
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() && self.current.is_none()
    }

    pub fn current(&self) -> Option<&CurrentCard> {
        self.current.as_ref()
    }

    /// The card to study next
    ///
    /// Returns the unscored current card if there is one, otherwise pops the
    /// queue. Items whose record disappeared from the store are dropped, as
    /// are items no longer due (refreshers excepted).
    pub fn next_card(&mut self, lexicon: &Lexicon, store: &ProgressStore) -> Option<&Flashcard> {
        if self.current.is_none() {
            while let Some(word) = self.queue.pop_front() {
                let Some(record) = store.get(&word) else {
                    tracing::warn!("'{}' left the progress store, dropping from queue", word);
                    continue;
                };
                if !record.is_due(self.today) && !self.refreshers.contains(&word) {
                    tracing::debug!("'{}' is due {}, dropping from queue", word, record.due);
                    continue;
                }
                self.current = Some(CurrentCard {
                    card: build_flashcard(&word, lexicon, store),
                    quiz: None,
                });
                break;
            }
        }
        self.current.as_ref().map(|c| &c.card)
    }

    /// Upcoming queued items, offered as review hints
    pub fn review_hints(&self) -> Vec<String> {
        self.queue.iter().take(REVIEW_HINT_COUNT).cloned().collect()
    }

    /// Generation request for the current card
    pub fn quiz_request(&self) -> Option<QuizRequest> {
        self.current
            .as_ref()
            .map(|c| QuizRequest::for_card(&c.card, self.review_hints()))
    }

    pub fn attach_quiz(&mut self, quiz: Mcq) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| Error::Other("no card in progress".into()))?;
        current.quiz = Some(quiz);
        Ok(())
    }

    /// Grade a zero-based answer choice against the attached quiz
    pub fn check_answer(&self, choice: usize) -> Result<AnswerOutcome> {
        let quiz = self
            .current
            .as_ref()
            .and_then(|c| c.quiz.as_ref())
            .ok_or_else(|| Error::Other("no quiz attached to the current card".into()))?;

        let chosen = quiz
            .options
            .get(choice)
            .ok_or_else(|| Error::Other(format!("choice {} out of range", choice + 1)))?;

        let answer = quiz.correct_option().to_string();
        if choice == quiz.answer_index {
            Ok(AnswerOutcome::Correct { answer })
        } else {
            Ok(AnswerOutcome::Incorrect {
                chosen: chosen.clone(),
                answer,
            })
        }
    }

    /// Drop the current card without scoring it
    pub fn skip_current(&mut self) -> Option<String> {
        let skipped = self.current.take().map(|c| c.card.word);
        if let Some(ref word) = skipped {
            self.skipped += 1;
            tracing::info!("Skipped '{}'", word);
        }
        skipped
    }

    /// Apply the learner's recall score to the current card
    ///
    /// The score is validated before any record changes. Known items found
    /// in the attached quiz sentence receive a passive update with the same
    /// score, unless they are still queued or were credited earlier in the
    /// session.
    pub fn record_score(
        &mut self,
        store: &mut ProgressStore,
        lexicon: &Lexicon,
        score: i64,
    ) -> Result<ScoreOutcome> {
        let recall = RecallScore::new(score)?;
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| Error::Other("no card in progress".into()))?;
        let word = current.card.word.clone();

        let record = store
            .get_mut(&word)
            .ok_or_else(|| Error::UnknownItem(word.clone()))?;
        update_active(record, score, self.today)?;
        let record = record.clone();

        let mut events = vec![ReviewEvent::capture(
            &word,
            ReviewKind::Active,
            recall,
            self.today,
            &record,
        )];

        let passive = match current.quiz.as_ref() {
            Some(quiz) => {
                let exclude: Vec<&str> = std::iter::once(word.as_str())
                    .chain(self.queue.iter().map(String::as_str))
                    .chain(self.credited.iter().map(String::as_str))
                    .collect();
                passive_review_sentence(
                    &quiz.sentence,
                    store,
                    lexicon,
                    recall,
                    &exclude,
                    self.today,
                )
            }
            None => Vec::new(),
        };
        for id in &passive {
            if let Some(r) = store.get(id) {
                events.push(ReviewEvent::capture(
                    id,
                    ReviewKind::Passive,
                    recall,
                    self.today,
                    r,
                ));
            }
        }

        self.credited.insert(word.clone());
        self.credited.extend(passive.iter().cloned());
        self.current = None;
        self.completed += 1;

        Ok(ScoreOutcome {
            word,
            record,
            passive,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{CatalogQuizBuilder, ContentGenerator};
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 19).unwrap()
    }

    fn test_lexicon() -> Lexicon {
        let words = [
            ("喜欢", "to like", 0.004),
            ("咖啡", "coffee", 0.0005),
            ("茶", "tea", 0.0009),
            ("朋友", "friend", 0.003),
            ("学校", "school", 0.002),
            ("医生", "doctor", 0.0007),
            ("水果", "fruit", 0.0004),
            ("电脑", "computer", 0.0006),
            ("飞机", "airplane", 0.0003),
            ("天气", "weather", 0.001),
        ];
        let items = words
            .iter()
            .map(|(id, def, freq)| {
                (
                    id.to_string(),
                    LexicalItem {
                        simplified: Some(id.to_string()),
                        definitions: vec![def.to_string()],
                        frequency: Some(*freq),
                        ..Default::default()
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        Lexicon::new(items)
    }

    fn quiz(sentence: &str) -> Mcq {
        Mcq {
            sentence: sentence.into(),
            question: "?".into(),
            options: ["a".into(), "b".into(), "c".into(), "d".into()],
            answer_index: 2,
        }
    }

    #[test]
    fn test_plan_seeds_and_queues() {
        crate::logging::init_test();
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        let mut rng = StdRng::seed_from_u64(3);

        let session = StudySession::plan(
            &lexicon,
            &mut store,
            &ScheduleConfig::default(),
            today(),
            &mut rng,
        );

        assert_eq!(session.introduced().len(), 6);
        assert_eq!(store.len(), 6);
        assert_eq!(session.remaining(), 6);
        assert!(session.queued().all(|id| store.contains(id)));
    }

    #[test]
    fn test_plan_appends_refreshers_after_due() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        let past = today() - Duration::days(20);
        for id in lexicon.ids() {
            let mut record = ProgressRecord::seeded(past);
            record.due = today() + Duration::days(5);
            store.insert(id.clone(), record);
        }
        store.get_mut("朋友").unwrap().due = today();

        let session = StudySession::plan(
            &lexicon,
            &mut store,
            &ScheduleConfig::default(),
            today(),
            &mut StdRng::seed_from_u64(11),
        );

        let queued: Vec<_> = session.queued().cloned().collect();
        assert_eq!(queued[0], "朋友");
        // Everything is seen: 6 unseen slots go empty, 2 refreshers
        assert!(session.introduced().is_empty());
        assert!(queued.len() >= 2 && queued.len() <= 3);

        // Refreshers are presented although they are not due
        let mut session = session;
        let mut presented = 0;
        while session.next_card(&lexicon, &store).is_some() {
            session.skip_current();
            presented += 1;
        }
        assert_eq!(presented, queued.len());
    }

    #[test]
    fn test_full_card_cycle_with_passive_review() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("喜欢", ProgressRecord::seeded(today()));
        let mut coffee = ProgressRecord::seeded(today() - Duration::days(3));
        coffee.repetitions = 1;
        coffee.interval = 1;
        coffee.due = today() + Duration::days(1);
        store.insert("咖啡", coffee);

        let mut session = StudySession::with_queue(today(), vec!["喜欢".into()]);

        let card = session.next_card(&lexicon, &store).unwrap();
        assert_eq!(card.word, "喜欢");
        session.attach_quiz(quiz("我很喜欢喝咖啡。")).unwrap();

        assert!(session.check_answer(2).unwrap().is_correct());
        assert_eq!(
            session.check_answer(0).unwrap(),
            AnswerOutcome::Incorrect {
                chosen: "a".into(),
                answer: "c".into()
            }
        );

        let outcome = session.record_score(&mut store, &lexicon, 5).unwrap();

        assert_eq!(outcome.word, "喜欢");
        assert_eq!(outcome.record.repetitions, 1);
        assert_eq!(outcome.passive, vec!["咖啡".to_string()]);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[1].kind, ReviewKind::Passive);
        assert_eq!(store.get("咖啡").unwrap().interval, 6);
        assert!(session.is_finished());
        assert_eq!(session.completed(), 1);
    }

    #[test]
    fn test_invalid_score_keeps_card() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("茶", ProgressRecord::seeded(today()));
        let mut session = StudySession::with_queue(today(), vec!["茶".into()]);
        session.next_card(&lexicon, &store);

        let result = session.record_score(&mut store, &lexicon, 7);

        assert!(matches!(result, Err(Error::InvalidScore(7))));
        assert_eq!(store.get("茶").unwrap().interval, 0);
        assert!(session.current().is_some());
    }

    #[test]
    fn test_vanished_record_is_unknown_item() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("茶", ProgressRecord::seeded(today()));
        let mut session = StudySession::with_queue(today(), vec!["茶".into()]);
        session.next_card(&lexicon, &store);
        store.records.remove("茶");

        let result = session.record_score(&mut store, &lexicon, 4);
        assert!(matches!(result, Err(Error::UnknownItem(w)) if w == "茶"));
    }

    #[test]
    fn test_skip_moves_on() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("茶", ProgressRecord::seeded(today()));
        store.insert("水果", ProgressRecord::seeded(today()));
        let mut session =
            StudySession::with_queue(today(), vec!["茶".into(), "水果".into()]);

        session.next_card(&lexicon, &store);
        assert_eq!(session.skip_current(), Some("茶".to_string()));

        let card = session.next_card(&lexicon, &store).unwrap();
        assert_eq!(card.word, "水果");
        assert_eq!(session.skipped(), 1);
        assert_eq!(store.get("茶").unwrap().interval, 0);
    }

    #[test]
    fn test_check_answer_without_quiz() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("茶", ProgressRecord::seeded(today()));
        let mut session = StudySession::with_queue(today(), vec!["茶".into()]);
        session.next_card(&lexicon, &store);

        assert!(session.check_answer(0).is_err());
    }

    /// Study every card with offline quizzes and one fixed score
    fn study_all(
        session: &mut StudySession,
        store: &mut ProgressStore,
        lexicon: &Lexicon,
        score: i64,
    ) -> Vec<ScoreOutcome> {
        let mut builder = CatalogQuizBuilder::new(lexicon, StdRng::seed_from_u64(5));
        let mut outcomes = Vec::new();
        while session.next_card(lexicon, store).is_some() {
            let request = session.quiz_request().unwrap();
            session.attach_quiz(builder.generate(&request).unwrap()).unwrap();
            outcomes.push(session.record_score(store, lexicon, score).unwrap());
        }
        outcomes
    }

    #[test]
    fn test_planned_session_moves_fresh_items_one_step() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        let mut session = StudySession::plan(
            &lexicon,
            &mut store,
            &ScheduleConfig::default(),
            today(),
            &mut StdRng::seed_from_u64(3),
        );
        let introduced = session.introduced().to_vec();

        let outcomes = study_all(&mut session, &mut store, &lexicon, 4);

        assert_eq!(outcomes.len(), 6);
        assert_eq!(session.completed(), 6);
        for id in &introduced {
            let record = store.get(id).unwrap();
            assert_eq!(record.repetitions, 1, "{id}");
            assert_eq!(record.interval, 1, "{id}");
            assert_eq!(record.due, today() + Duration::days(1), "{id}");
            assert_eq!(record.last_phantom_score, None, "{id}");
        }
    }

    #[test]
    fn test_queued_hints_are_not_credited() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        for id in ["天气", "飞机", "医生"] {
            store.insert(id, ProgressRecord::seeded(today()));
        }
        let mut session = StudySession::with_queue(
            today(),
            vec!["天气".into(), "飞机".into(), "医生".into()],
        );

        session.next_card(&lexicon, &store);
        assert_eq!(session.quiz_request().unwrap().review_words, vec!["飞机", "医生"]);

        let outcomes = study_all(&mut session, &mut store, &lexicon, 4);

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.passive.is_empty()));
        for id in ["天气", "飞机", "医生"] {
            let record = store.get(id).unwrap();
            assert_eq!((record.repetitions, record.interval), (1, 1), "{id}");
        }
    }

    #[test]
    fn test_offline_sentence_leaves_unshown_items_alone() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        let mut known = ProgressRecord::seeded(today() - Duration::days(10));
        known.repetitions = 2;
        known.interval = 6;
        known.due = today() + Duration::days(3);
        store.insert("今天", known.clone());
        for id in ["今", "天", "的", "词", "复习"] {
            store.insert(id, known.clone());
        }
        for id in ["茶", "水果", "电脑"] {
            store.insert(id, ProgressRecord::seeded(today()));
        }
        let mut session = StudySession::with_queue(
            today(),
            vec!["茶".into(), "水果".into(), "电脑".into()],
        );

        let outcomes = study_all(&mut session, &mut store, &lexicon, 5);

        assert!(outcomes.iter().all(|o| o.passive.is_empty()));
        for id in ["今天", "今", "天", "的", "词", "复习"] {
            assert_eq!(store.get(id).unwrap(), &known, "{id}");
        }
    }

    #[test]
    fn test_item_credited_once_per_session() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        store.insert("喜欢", ProgressRecord::seeded(today()));
        store.insert("茶", ProgressRecord::seeded(today()));
        let mut coffee = ProgressRecord::seeded(today() - Duration::days(3));
        coffee.repetitions = 1;
        coffee.interval = 1;
        coffee.due = today() + Duration::days(1);
        store.insert("咖啡", coffee);
        let mut session = StudySession::with_queue(today(), vec!["喜欢".into(), "茶".into()]);

        session.next_card(&lexicon, &store);
        session.attach_quiz(quiz("喜欢咖啡。")).unwrap();
        let first = session.record_score(&mut store, &lexicon, 5).unwrap();

        session.next_card(&lexicon, &store);
        session.attach_quiz(quiz("茶和咖啡，我都喜欢。")).unwrap();
        let second = session.record_score(&mut store, &lexicon, 5).unwrap();

        assert_eq!(first.passive, vec!["咖啡".to_string()]);
        assert!(second.passive.is_empty());
        assert_eq!(store.get("咖啡").unwrap().repetitions, 2);
        assert_eq!(store.get("喜欢").unwrap().repetitions, 1);
    }

    #[test]
    fn test_not_due_item_dropped_unless_refresher() {
        let lexicon = test_lexicon();
        let mut store = ProgressStore::default();
        let mut later = ProgressRecord::seeded(today() - Duration::days(2));
        later.due = today() + Duration::days(1);
        store.insert("茶", later);
        store.insert("水果", ProgressRecord::seeded(today()));
        let mut session = StudySession::with_queue(today(), vec!["茶".into(), "水果".into()]);

        assert_eq!(session.next_card(&lexicon, &store).unwrap().word, "水果");
        session.skip_current();
        assert!(session.next_card(&lexicon, &store).is_none());
    }
}
