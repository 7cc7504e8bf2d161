use lazy_static::lazy_static;
use regex::Regex;

use super::normalize;
use crate::models::{
    quiz::{QuizMode, QuizResult},
    vocabulary::Vocabulary,
};

lazy_static! {
    static ref MEANING_SEPARATORS: Regex = Regex::new(r"[,;]").unwrap();
    static ref WORD: Regex = Regex::new(r"\b\w+\b").unwrap();
}

/// Grades a submitted answer against a vocabulary entry.
pub fn check_answer(vocab: &Vocabulary, mode: QuizMode, submitted: &str) -> QuizResult {
    let normalized = normalize(submitted);

    let (correct, correct_answer) = match mode {
        QuizMode::ToJapanese | QuizMode::FillInBlank => (
            !normalized.is_empty() && normalized == normalize(&vocab.reading),
            vocab.reading.clone(),
        ),
        QuizMode::ToEnglish => (
            !normalized.is_empty() && matches_meaning(&vocab.meaning, &normalized),
            vocab.meaning.clone(),
        ),
    };

    QuizResult {
        correct,
        correct_answer,
        user_answer: submitted.to_string(),
        normalized_answer: normalized,
    }
}

/// An English answer counts when it is a whole synonym, a single word of a
/// synonym, or a word-bounded phrase inside the meaning.
fn matches_meaning(meaning: &str, answer: &str) -> bool {
    let meaning = meaning.to_lowercase();

    let part_match = MEANING_SEPARATORS.split(&meaning).map(str::trim).any(|part| {
        part == answer || WORD.find_iter(part).any(|word| word.as_str() == answer)
    });
    if part_match {
        return true;
    }

    if !meaning.contains(answer) {
        return false;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(answer)))
        .map(|pattern| pattern.is_match(&meaning))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taberu() -> Vocabulary {
        Vocabulary::new("食べる", "たべる", "to eat, eat", "verb n5")
    }

    #[test]
    fn english_synonym_is_accepted() {
        let vocab = taberu();
        assert!(check_answer(&vocab, QuizMode::ToEnglish, "eat").correct);
        assert!(check_answer(&vocab, QuizMode::ToEnglish, " To Eat ").correct);
        assert!(!check_answer(&vocab, QuizMode::ToEnglish, "drink").correct);
    }

    #[test]
    fn english_accepts_any_segment_with_semicolons() {
        let vocab = Vocabulary::new("大きい", "おおきい", "big; large, great", "");
        for answer in ["big", "LARGE", "great "] {
            assert!(check_answer(&vocab, QuizMode::ToEnglish, answer).correct, "{answer}");
        }
    }

    #[test]
    fn english_word_inside_a_phrase_counts() {
        let vocab = Vocabulary::new("走る", "はしる", "to run quickly", "");
        assert!(check_answer(&vocab, QuizMode::ToEnglish, "run").correct);
        assert!(check_answer(&vocab, QuizMode::ToEnglish, "run quickly").correct);
        assert!(!check_answer(&vocab, QuizMode::ToEnglish, "ru").correct);
    }

    #[test]
    fn english_result_reports_full_meaning() {
        let result = check_answer(&taberu(), QuizMode::ToEnglish, "Eat");
        assert_eq!(result.correct_answer, "to eat, eat");
        assert_eq!(result.user_answer, "Eat");
        assert_eq!(result.normalized_answer, "eat");
    }

    #[test]
    fn japanese_modes_compare_normalized_reading() {
        let vocab = taberu();
        assert!(check_answer(&vocab, QuizMode::ToJapanese, "\u{3000}たべる ").correct);
        assert!(check_answer(&vocab, QuizMode::FillInBlank, "たべる").correct);
        assert!(!check_answer(&vocab, QuizMode::FillInBlank, "たべた").correct);

        let result = check_answer(&vocab, QuizMode::FillInBlank, "たべる");
        assert_eq!(result.correct_answer, "たべる");
    }

    #[test]
    fn empty_answer_is_never_correct() {
        let trailing = Vocabulary::new("何", "", "what,", "");
        for mode in QuizMode::ALL {
            assert!(!check_answer(&trailing, mode, "   ").correct);
        }
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let vocab = Vocabulary::new("え", "え", "picture (drawing)", "");
        assert!(!check_answer(&vocab, QuizMode::ToEnglish, ".*").correct);
    }
}
