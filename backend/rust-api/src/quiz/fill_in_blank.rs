use rand::Rng;

/// Fullwidth low line shown in place of each hidden character.
pub const GAP_CHAR: char = '＿';

/// Shortest reading (in characters) that can be turned into a gap question.
pub const MIN_READING_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillInBlank {
    pub display_text: String,
    pub gap_indices: Vec<usize>,
}

/// Number of gaps for a reading of `len` characters.
pub fn gap_count(len: usize) -> usize {
    match len {
        0..=4 => 1,
        5..=6 => 2,
        _ => 3,
    }
}

/// Masks `gap_count` distinct, randomly chosen characters of `reading`.
///
/// Indices are character positions, sorted ascending. Callers only pass
/// readings of at least [`MIN_READING_LEN`] characters.
pub fn create_fill_in_blank<R: Rng + ?Sized>(rng: &mut R, reading: &str) -> FillInBlank {
    let chars: Vec<char> = reading.chars().collect();
    let amount = gap_count(chars.len()).min(chars.len());

    let mut gap_indices = rand::seq::index::sample(rng, chars.len(), amount).into_vec();
    gap_indices.sort_unstable();

    let display_text = chars
        .iter()
        .enumerate()
        .map(|(idx, ch)| {
            if gap_indices.binary_search(&idx).is_ok() {
                GAP_CHAR
            } else {
                *ch
            }
        })
        .collect();

    FillInBlank {
        display_text,
        gap_indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_count_follows_length_bands() {
        assert_eq!(gap_count(3), 1);
        assert_eq!(gap_count(4), 1);
        assert_eq!(gap_count(5), 2);
        assert_eq!(gap_count(6), 2);
        assert_eq!(gap_count(7), 3);
        assert_eq!(gap_count(12), 3);
    }

    #[test]
    fn gaps_are_distinct_sorted_and_in_range() {
        let mut rng = rand::rng();
        for reading in ["たべる", "ともだち", "がっこうの", "しんかんせん", "おはようございます"] {
            let len = reading.chars().count();
            for _ in 0..50 {
                let blank = create_fill_in_blank(&mut rng, reading);
                assert_eq!(blank.gap_indices.len(), gap_count(len));
                assert!(blank.gap_indices.windows(2).all(|w| w[0] < w[1]));
                assert!(blank.gap_indices.iter().all(|&idx| idx < len));
            }
        }
    }

    #[test]
    fn display_text_masks_only_gap_positions() {
        let mut rng = rand::rng();
        let reading = "しんかんせん";
        let blank = create_fill_in_blank(&mut rng, reading);

        let shown: Vec<char> = blank.display_text.chars().collect();
        assert_eq!(shown.len(), reading.chars().count());
        for (idx, (shown_ch, original)) in shown.iter().zip(reading.chars()).enumerate() {
            if blank.gap_indices.contains(&idx) {
                assert_eq!(*shown_ch, GAP_CHAR);
            } else {
                assert_eq!(*shown_ch, original);
            }
        }
    }

    #[test]
    fn three_char_reading_gets_one_gap() {
        let mut rng = rand::rng();
        let blank = create_fill_in_blank(&mut rng, "たべる");
        assert_eq!(blank.gap_indices.len(), 1);
        assert_eq!(blank.display_text.matches(GAP_CHAR).count(), 1);
    }
}
