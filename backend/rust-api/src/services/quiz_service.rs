use rand::Rng;

use crate::{
    error::{AppError, AppResult},
    metrics::{QUIZ_ANSWERS_TOTAL, QUIZ_QUESTIONS_TOTAL},
    models::{
        quiz::{QuestionType, QuizAnswerRequest, QuizMode, QuizQuestion, QuizResult},
        vocabulary::Vocabulary,
    },
    quiz::{
        build_options, check_answer, create_fill_in_blank, option_text, DISTRACTOR_COUNT,
        MIN_READING_LEN,
    },
    stores::{Stores, VocabularyFilter},
};

pub const MAX_OPTION_COUNT: usize = 5;

pub struct QuizService<'a> {
    stores: &'a Stores,
}

impl<'a> QuizService<'a> {
    pub fn new(stores: &'a Stores) -> Self {
        Self { stores }
    }

    /// Random question, optionally restricted to entries carrying every tag.
    ///
    /// A fill-in-blank roll with no long enough reading falls back once to
    /// one of the direct modes over the unrestricted candidate set.
    pub async fn next_question(&self, tags: Vec<String>) -> AppResult<QuizQuestion> {
        let mut filter = VocabularyFilter::with_tags(tags);
        let mut mode = pick(&QuizMode::ALL);

        if mode == QuizMode::FillInBlank {
            filter.min_reading_len = Some(MIN_READING_LEN);
        }
        let mut vocab = self.sample_one(&filter).await?;

        if vocab.is_none() && mode == QuizMode::FillInBlank {
            mode = pick(&QuizMode::DIRECT);
            filter.min_reading_len = None;
            tracing::debug!(mode = mode.as_str(), "No reading long enough for gaps, falling back");
            vocab = self.sample_one(&filter).await?;
        }

        let vocab = vocab
            .ok_or_else(|| AppError::not_found("No vocabulary found matching the criteria"))?;

        let question = match mode {
            QuizMode::FillInBlank => fill_in_blank_question(vocab),
            direct => self.direct_question(vocab, direct).await?,
        };

        QUIZ_QUESTIONS_TOTAL
            .with_label_values(&[
                question.mode.as_str(),
                question_type_label(question.question_type),
            ])
            .inc();

        Ok(question)
    }

    /// Up to `count` wrong answers drawn from entries other than `exclude_id`.
    pub async fn distractors(
        &self,
        exclude_id: &str,
        mode: QuizMode,
        count: Option<usize>,
    ) -> AppResult<Vec<String>> {
        if mode == QuizMode::FillInBlank {
            return Err(AppError::validation(
                "mode must be one of: to_japanese, to_english",
            ));
        }
        let count = count.unwrap_or(DISTRACTOR_COUNT);
        if !(1..=MAX_OPTION_COUNT).contains(&count) {
            return Err(AppError::validation(format!(
                "count must be between 1 and {}",
                MAX_OPTION_COUNT
            )));
        }

        let others = self
            .stores
            .vocabulary
            .random_sample(&VocabularyFilter::excluding(exclude_id), count)
            .await?;

        Ok(others.iter().map(|vocab| option_text(vocab, mode)).collect())
    }

    pub async fn check(&self, req: QuizAnswerRequest) -> AppResult<QuizResult> {
        let vocab = self
            .stores
            .vocabulary
            .get(&req.vocabulary_id)
            .await?
            .ok_or_else(|| AppError::not_found("Vocabulary not found"))?;

        let result = check_answer(&vocab, req.mode, &req.answer);

        QUIZ_ANSWERS_TOTAL
            .with_label_values(&[req.mode.as_str(), if result.correct { "true" } else { "false" }])
            .inc();

        Ok(result)
    }

    async fn sample_one(&self, filter: &VocabularyFilter) -> AppResult<Option<Vocabulary>> {
        let mut sample = self.stores.vocabulary.random_sample(filter, 1).await?;
        Ok(sample.pop())
    }

    async fn direct_question(&self, vocab: Vocabulary, mode: QuizMode) -> AppResult<QuizQuestion> {
        let question_type = pick(&QuestionType::ALL);

        let options = match question_type {
            QuestionType::MultipleChoice => {
                // Distractors ignore the tag filter.
                let others = self
                    .stores
                    .vocabulary
                    .random_sample(&VocabularyFilter::excluding(&vocab.id), DISTRACTOR_COUNT)
                    .await?;
                let options = build_options(&mut rand::rng(), &vocab, &others, mode);
                Some(options)
            }
            QuestionType::Text => None,
        };

        let question = match mode {
            QuizMode::ToEnglish => format!("{} ({})", vocab.expression, vocab.reading),
            QuizMode::ToJapanese | QuizMode::FillInBlank => vocab.meaning.clone(),
        };

        Ok(QuizQuestion {
            vocabulary_id: vocab.id,
            question,
            mode,
            question_type,
            options,
            display_text: None,
            gap_indices: None,
            gap_count: None,
            tts_text: None,
        })
    }
}

fn fill_in_blank_question(vocab: Vocabulary) -> QuizQuestion {
    let blank = create_fill_in_blank(&mut rand::rng(), &vocab.reading);
    QuizQuestion {
        question: vocab.meaning,
        mode: QuizMode::FillInBlank,
        question_type: QuestionType::Text,
        options: None,
        display_text: Some(blank.display_text),
        gap_count: Some(blank.gap_indices.len()),
        gap_indices: Some(blank.gap_indices),
        tts_text: Some(vocab.reading),
        vocabulary_id: vocab.id,
    }
}

fn pick<T: Copy>(items: &[T]) -> T {
    items[rand::rng().random_range(0..items.len())]
}

fn question_type_label(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::Text => "text",
        QuestionType::MultipleChoice => "multiple_choice",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::GAP_CHAR;

    async fn seeded(entries: &[(&str, &str, &str, &str)]) -> Stores {
        let stores = Stores::in_memory();
        for (expression, reading, meaning, tags) in entries {
            stores
                .vocabulary
                .insert(&Vocabulary::new(*expression, *reading, *meaning, *tags))
                .await
                .unwrap();
        }
        stores
    }

    #[tokio::test]
    async fn empty_store_is_not_found() {
        let stores = Stores::in_memory();
        let err = QuizService::new(&stores)
            .next_question(Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn short_readings_never_get_gaps() {
        let stores = seeded(&[("木", "き", "tree", ""), ("目", "め", "eye", "")]).await;
        let service = QuizService::new(&stores);
        for _ in 0..50 {
            let question = service.next_question(Vec::new()).await.unwrap();
            assert_ne!(question.mode, QuizMode::FillInBlank);
        }
    }

    #[tokio::test]
    async fn fill_in_blank_question_shape() {
        let stores = seeded(&[("食べる", "たべる", "to eat, eat", "verb")]).await;
        let service = QuizService::new(&stores);
        for _ in 0..50 {
            let question = service.next_question(Vec::new()).await.unwrap();
            match question.mode {
                QuizMode::FillInBlank => {
                    assert_eq!(question.question_type, QuestionType::Text);
                    assert_eq!(question.gap_count, Some(1));
                    assert_eq!(question.tts_text.as_deref(), Some("たべる"));
                    let display = question.display_text.unwrap();
                    assert_eq!(display.chars().filter(|c| *c == GAP_CHAR).count(), 1);
                    assert_eq!(question.question, "to eat, eat");
                }
                QuizMode::ToEnglish => assert_eq!(question.question, "食べる (たべる)"),
                QuizMode::ToJapanese => assert_eq!(question.question, "to eat, eat"),
            }
        }
    }

    #[tokio::test]
    async fn tag_filter_limits_candidates() {
        let stores = seeded(&[
            ("猫", "ねこ", "cat", "animals n5"),
            ("走る", "はしる", "to run", "verbs n5"),
        ])
        .await;
        let service = QuizService::new(&stores);
        for _ in 0..20 {
            let question = service
                .next_question(vec!["ANIMALS".to_string()])
                .await
                .unwrap();
            let vocab = stores.vocabulary.get(&question.vocabulary_id).await.unwrap().unwrap();
            assert_eq!(vocab.expression, "猫");
        }
        assert!(service
            .next_question(vec!["adjectives".to_string()])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn distractors_validate_count_and_mode() {
        let stores = seeded(&[("水", "みず", "water", ""), ("火", "ひ", "fire", "")]).await;
        let service = QuizService::new(&stores);
        assert!(service.distractors("x", QuizMode::ToJapanese, Some(0)).await.is_err());
        assert!(service.distractors("x", QuizMode::ToJapanese, Some(6)).await.is_err());
        assert!(service.distractors("x", QuizMode::FillInBlank, None).await.is_err());

        let options = service.distractors("x", QuizMode::ToEnglish, None).await.unwrap();
        assert_eq!(options.len(), 2);
    }
}
