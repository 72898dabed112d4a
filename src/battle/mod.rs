pub mod catalog;

use crate::friends::User;
use catalog::QuestionCatalog;
use rand::Rng;

pub const QUESTIONS_PER_BATTLE: usize = 5;
pub const QUESTION_SECONDS: u32 = 15;
pub const BASE_REWARD: u32 = 10;
pub const SPEED_BONUS_DIVISOR: u32 = 3;
pub const WIN_SCORE_THRESHOLD: u32 = 40;
pub const FINAL_OPPONENT_SCORE: u32 = 35;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        options: Vec<String>,
        correct_index: usize,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            options,
            correct_index,
            explanation: explanation.into(),
        }
    }
}

/// Where the session currently is. A timed-out question is an `Answered`
/// with no selection, which always counts as incorrect.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    AwaitingAnswer,
    Answered {
        selected: Option<usize>,
        correct: bool,
    },
    Finished,
}

/// What `acknowledge` did with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    NextQuestion,
    Finished(u32),
}

/// One timed run of five questions against a nominal opponent.
///
/// The countdown is tick-driven rather than wall-clock-driven: the caller
/// feeds elapsed seconds in through `tick`/`elapse`, and tests advance
/// virtual time the same way. Ticks outside `AwaitingAnswer` are no-ops,
/// so a late tick can never mutate a session that has already advanced.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BattleSession {
    pub opponent: User,
    questions: Vec<Question>,
    current: usize,
    score: u32,
    time_left: u32,
    phase: Phase,
}

impl BattleSession {
    /// Draws `QUESTIONS_PER_BATTLE` questions from the catalog with cyclic
    /// index access, so a short catalog wraps around.
    pub fn new(opponent: User, catalog: &QuestionCatalog) -> Self {
        let questions = (0..QUESTIONS_PER_BATTLE)
            .map(|i| catalog.question(i).clone())
            .collect();

        Self {
            opponent,
            questions,
            current: 0,
            score: 0,
            time_left: QUESTION_SECONDS,
            phase: Phase::AwaitingAnswer,
        }
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    /// 1-based, for display.
    pub fn question_number(&self) -> usize {
        self.current + 1
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_answered(&self) -> bool {
        matches!(self.phase, Phase::Answered { .. })
    }

    /// Locks in one answer for the current question. Ignored unless the
    /// session is awaiting an answer, so repeated submissions are no-ops.
    /// An out-of-range index is accepted and scored as incorrect.
    pub fn submit_answer(&mut self, index: usize) {
        if self.phase != Phase::AwaitingAnswer {
            return;
        }

        let correct = index == self.current_question().correct_index;
        if correct {
            self.score += BASE_REWARD + self.time_left / SPEED_BONUS_DIVISOR;
        }
        self.phase = Phase::Answered {
            selected: Some(index),
            correct,
        };
    }

    /// One countdown second. At zero the question resolves as an implicit
    /// incorrect answer with no selection.
    pub fn tick(&mut self) {
        if self.phase != Phase::AwaitingAnswer {
            return;
        }

        if self.time_left > 0 {
            self.time_left -= 1;
        }
        if self.time_left == 0 {
            self.phase = Phase::Answered {
                selected: None,
                correct: false,
            };
        }
    }

    /// Applies a whole number of elapsed seconds to the countdown. Stops
    /// as soon as the question resolves.
    pub fn elapse(&mut self, seconds: u64) {
        for _ in 0..seconds {
            if self.phase != Phase::AwaitingAnswer {
                return;
            }
            self.tick();
        }
    }

    /// Moves past an answered question: either on to the next one with a
    /// full countdown, or to `Finished` with the final score after the
    /// last question. Ignored unless the current question is answered.
    pub fn acknowledge(&mut self) -> Option<Advance> {
        if !self.is_answered() {
            return None;
        }

        if self.current + 1 < self.questions.len() {
            self.current += 1;
            self.time_left = QUESTION_SECONDS;
            self.phase = Phase::AwaitingAnswer;
            Some(Advance::NextQuestion)
        } else {
            self.phase = Phase::Finished;
            Some(Advance::Finished(self.score))
        }
    }
}

/// Win/loss is purely a display classification against a fixed threshold;
/// there is no real opponent simulation behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn of_score(score: u32) -> Self {
        if score > WIN_SCORE_THRESHOLD {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }

    pub fn xp_reward(&self) -> u32 {
        match self {
            Outcome::Win => 50,
            Outcome::Loss => 20,
        }
    }
}

/// Cosmetic opponent pace shown during play. Not authoritative.
pub fn opponent_display_score(questions_answered: usize) -> u32 {
    questions_answered as u32 * 8 + rand::thread_rng().gen_range(0..5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friends::FriendDirectory;

    fn question(id: &str, correct_index: usize) -> Question {
        Question::new(
            id,
            format!("question {}", id),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index,
            "because",
        )
    }

    fn catalog() -> QuestionCatalog {
        QuestionCatalog::new(vec![
            question("q1", 0),
            question("q2", 1),
            question("q3", 2),
            question("q4", 3),
            question("q5", 0),
        ])
    }

    fn session() -> BattleSession {
        let opponent = FriendDirectory::with_mock_friends().list()[0].clone();
        BattleSession::new(opponent, &catalog())
    }

    #[test]
    fn correct_answer_scores_base_plus_speed_bonus() {
        let mut session = session();
        session.elapse(3);
        assert_eq!(session.time_left(), 12);

        session.submit_answer(0);
        assert_eq!(session.score(), 14);
        assert_eq!(
            session.phase(),
            &Phase::Answered {
                selected: Some(0),
                correct: true
            }
        );
    }

    #[test]
    fn no_speed_bonus_under_three_seconds() {
        let mut session = session();
        session.elapse(13);
        assert_eq!(session.time_left(), 2);

        session.submit_answer(0);
        assert_eq!(session.score(), BASE_REWARD);
    }

    #[test]
    fn incorrect_answer_leaves_score_unchanged() {
        let mut session = session();
        session.submit_answer(3);
        assert_eq!(session.score(), 0);
        assert_eq!(
            session.phase(),
            &Phase::Answered {
                selected: Some(3),
                correct: false
            }
        );
    }

    #[test]
    fn out_of_range_answer_is_incorrect() {
        let mut session = session();
        session.submit_answer(99);
        assert_eq!(session.score(), 0);
        assert!(session.is_answered());
    }

    #[test]
    fn timer_expiry_resolves_as_unanswered_incorrect() {
        let mut session = session();
        session.elapse(QUESTION_SECONDS as u64);
        assert_eq!(
            session.phase(),
            &Phase::Answered {
                selected: None,
                correct: false
            }
        );
        assert_eq!(session.score(), 0);

        // Extra elapsed time against a resolved question changes nothing.
        session.elapse(100);
        assert_eq!(
            session.phase(),
            &Phase::Answered {
                selected: None,
                correct: false
            }
        );
    }

    #[test]
    fn second_submission_is_ignored() {
        let mut session = session();
        session.elapse(3);
        session.submit_answer(0);
        let score = session.score();

        session.submit_answer(1);
        session.submit_answer(0);
        assert_eq!(session.score(), score);
        assert_eq!(
            session.phase(),
            &Phase::Answered {
                selected: Some(0),
                correct: true
            }
        );
    }

    #[test]
    fn acknowledge_before_answering_is_ignored() {
        let mut session = session();
        assert_eq!(session.acknowledge(), None);
        assert_eq!(session.phase(), &Phase::AwaitingAnswer);
        assert_eq!(session.question_number(), 1);
    }

    #[test]
    fn acknowledge_resets_the_countdown() {
        let mut session = session();
        session.elapse(10);
        session.submit_answer(0);
        assert_eq!(session.acknowledge(), Some(Advance::NextQuestion));
        assert_eq!(session.question_number(), 2);
        assert_eq!(session.time_left(), QUESTION_SECONDS);
        assert_eq!(session.phase(), &Phase::AwaitingAnswer);
    }

    #[test]
    fn session_finishes_after_five_questions() {
        let mut session = session();
        let correct = [0, 1, 2, 3, 0];

        for (i, &answer) in correct.iter().enumerate() {
            assert_eq!(session.question_number(), i + 1);
            // Answer instantly for the full speed bonus.
            session.submit_answer(answer);
            let advance = session.acknowledge().unwrap();
            if i < 4 {
                assert_eq!(advance, Advance::NextQuestion);
            } else {
                // 5 * (10 + 15 / 3)
                assert_eq!(advance, Advance::Finished(75));
            }
        }

        assert_eq!(session.phase(), &Phase::Finished);
        // A finished session ignores everything.
        session.submit_answer(0);
        assert_eq!(session.acknowledge(), None);
        assert_eq!(session.score(), 75);
    }

    #[test]
    fn full_session_scenario() {
        let mut session = session();

        // Q1 answered correctly with 12s left: 10 + 4.
        session.elapse(3);
        session.submit_answer(0);
        assert_eq!(session.score(), 14);
        session.acknowledge();

        // Q2 expires unanswered.
        session.elapse(20);
        assert_eq!(session.score(), 14);
        session.acknowledge();

        // Q3 answered incorrectly.
        session.submit_answer(0);
        assert_eq!(session.score(), 14);
        session.acknowledge();

        // Q4 and Q5 answered correctly with no speed bonus left.
        for answer in [3, 0] {
            session.elapse(13);
            session.submit_answer(answer);
            session.acknowledge();
        }

        assert_eq!(session.phase(), &Phase::Finished);
        assert_eq!(session.score(), 34);
    }

    #[test]
    fn short_catalog_wraps_around() {
        let catalog = QuestionCatalog::new(vec![question("q1", 0), question("q2", 1)]);
        let opponent = FriendDirectory::with_mock_friends().list()[0].clone();
        let mut session = BattleSession::new(opponent, &catalog);

        assert_eq!(session.current_question().id, "q1");
        session.submit_answer(0);
        session.acknowledge();
        assert_eq!(session.current_question().id, "q2");
        session.submit_answer(1);
        session.acknowledge();
        assert_eq!(session.current_question().id, "q1");
    }

    #[test]
    fn outcome_threshold() {
        assert_eq!(Outcome::of_score(40), Outcome::Loss);
        assert_eq!(Outcome::of_score(41), Outcome::Win);
        assert_eq!(Outcome::of_score(41).xp_reward(), 50);
        assert_eq!(Outcome::of_score(0).xp_reward(), 20);
    }
}
