use rand::{seq::SliceRandom, Rng};

use crate::models::{quiz::QuizMode, vocabulary::Vocabulary};

/// How many wrong answers a multiple choice question shows.
pub const DISTRACTOR_COUNT: usize = 3;

/// Text shown for `vocab` as an answer option: the reading when the learner
/// must answer in Japanese, otherwise the first synonym of the meaning.
pub fn option_text(vocab: &Vocabulary, mode: QuizMode) -> String {
    match mode {
        QuizMode::ToJapanese | QuizMode::FillInBlank => vocab.reading.clone(),
        QuizMode::ToEnglish => vocab.primary_meaning().to_string(),
    }
}

/// Correct answer plus distractors, shuffled.
pub fn build_options<R: Rng + ?Sized>(
    rng: &mut R,
    correct: &Vocabulary,
    distractors: &[Vocabulary],
    mode: QuizMode,
) -> Vec<String> {
    let mut options: Vec<String> = std::iter::once(correct)
        .chain(distractors.iter().filter(|other| other.id != correct.id))
        .map(|vocab| option_text(vocab, mode))
        .collect();
    options.shuffle(rng);
    options
}
