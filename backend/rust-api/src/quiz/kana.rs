use rand::{seq::index, Rng};

use crate::models::kana::{KanaItem, KanaScript};

/// Default syllables per salad round.
pub const DEFAULT_KANA_COUNT: usize = 20;
pub const MAX_KANA_COUNT: usize = 109;

/// (romaji, hiragana, katakana): gojuon, dakuten, handakuten, then yoon.
const KANA_TABLE: &[(&str, &str, &str)] = &[
    ("a", "あ", "ア"),
    ("i", "い", "イ"),
    ("u", "う", "ウ"),
    ("e", "え", "エ"),
    ("o", "お", "オ"),
    ("ka", "か", "カ"),
    ("ki", "き", "キ"),
    ("ku", "く", "ク"),
    ("ke", "け", "ケ"),
    ("ko", "こ", "コ"),
    ("sa", "さ", "サ"),
    ("shi", "し", "シ"),
    ("su", "す", "ス"),
    ("se", "せ", "セ"),
    ("so", "そ", "ソ"),
    ("ta", "た", "タ"),
    ("chi", "ち", "チ"),
    ("tsu", "つ", "ツ"),
    ("te", "て", "テ"),
    ("to", "と", "ト"),
    ("na", "な", "ナ"),
    ("ni", "に", "ニ"),
    ("nu", "ぬ", "ヌ"),
    ("ne", "ね", "ネ"),
    ("no", "の", "ノ"),
    ("ha", "は", "ハ"),
    ("hi", "ひ", "ヒ"),
    ("fu", "ふ", "フ"),
    ("he", "へ", "ヘ"),
    ("ho", "ほ", "ホ"),
    ("ma", "ま", "マ"),
    ("mi", "み", "ミ"),
    ("mu", "む", "ム"),
    ("me", "め", "メ"),
    ("mo", "も", "モ"),
    ("ya", "や", "ヤ"),
    ("yu", "ゆ", "ユ"),
    ("yo", "よ", "ヨ"),
    ("ra", "ら", "ラ"),
    ("ri", "り", "リ"),
    ("ru", "る", "ル"),
    ("re", "れ", "レ"),
    ("ro", "ろ", "ロ"),
    ("wa", "わ", "ワ"),
    ("wo", "を", "ヲ"),
    ("n", "ん", "ン"),
    ("ga", "が", "ガ"),
    ("gi", "ぎ", "ギ"),
    ("gu", "ぐ", "グ"),
    ("ge", "げ", "ゲ"),
    ("go", "ご", "ゴ"),
    ("za", "ざ", "ザ"),
    ("ji", "じ", "ジ"),
    ("zu", "ず", "ズ"),
    ("ze", "ぜ", "ゼ"),
    ("zo", "ぞ", "ゾ"),
    ("da", "だ", "ダ"),
    ("di", "ぢ", "ヂ"),
    ("du", "づ", "ヅ"),
    ("de", "で", "デ"),
    ("do", "ど", "ド"),
    ("ba", "ば", "バ"),
    ("bi", "び", "ビ"),
    ("bu", "ぶ", "ブ"),
    ("be", "べ", "ベ"),
    ("bo", "ぼ", "ボ"),
    ("pa", "ぱ", "パ"),
    ("pi", "ぴ", "ピ"),
    ("pu", "ぷ", "プ"),
    ("pe", "ぺ", "ペ"),
    ("po", "ぽ", "ポ"),
    ("kya", "きゃ", "キャ"),
    ("kyu", "きゅ", "キュ"),
    ("kyo", "きょ", "キョ"),
    ("sha", "しゃ", "シャ"),
    ("shu", "しゅ", "シュ"),
    ("sho", "しょ", "ショ"),
    ("cha", "ちゃ", "チャ"),
    ("chu", "ちゅ", "チュ"),
    ("cho", "ちょ", "チョ"),
    ("nya", "にゃ", "ニャ"),
    ("nyu", "にゅ", "ニュ"),
    ("nyo", "にょ", "ニョ"),
    ("hya", "ひゃ", "ヒャ"),
    ("hyu", "ひゅ", "ヒュ"),
    ("hyo", "ひょ", "ヒョ"),
    ("mya", "みゃ", "ミャ"),
    ("myu", "みゅ", "ミュ"),
    ("myo", "みょ", "ミョ"),
    ("rya", "りゃ", "リャ"),
    ("ryu", "りゅ", "リュ"),
    ("ryo", "りょ", "リョ"),
    ("gya", "ぎゃ", "ギャ"),
    ("gyu", "ぎゅ", "ギュ"),
    ("gyo", "ぎょ", "ギョ"),
    ("ja", "じゃ", "ジャ"),
    ("ju", "じゅ", "ジュ"),
    ("jo", "じょ", "ジョ"),
    ("bya", "びゃ", "ビャ"),
    ("byu", "びゅ", "ビュ"),
    ("byo", "びょ", "ビョ"),
    ("pya", "ぴゃ", "ピャ"),
    ("pyu", "ぴゅ", "ピュ"),
    ("pyo", "ぴょ", "ピョ"),
];

fn item(row: &(&'static str, &'static str, &'static str), script: KanaScript) -> KanaItem {
    let (romaji, hiragana, katakana) = *row;
    let kana = match script {
        KanaScript::Katakana => katakana,
        _ => hiragana,
    };
    KanaItem { romaji, kana }
}

pub fn all_kana(script: KanaScript) -> Vec<KanaItem> {
    KANA_TABLE.iter().map(|row| item(row, script)).collect()
}

/// `count` distinct syllables in random order, capped at the table size.
/// In mixed mode each pick flips a coin between the two scripts, so a romaji
/// never shows up twice.
pub fn random_kana<R: Rng + ?Sized>(rng: &mut R, script: KanaScript, count: usize) -> Vec<KanaItem> {
    let amount = count.min(KANA_TABLE.len());
    index::sample(rng, KANA_TABLE.len(), amount)
        .into_iter()
        .map(|i| {
            let row = &KANA_TABLE[i];
            match script {
                KanaScript::Mixed if rng.random_bool(0.5) => item(row, KanaScript::Katakana),
                KanaScript::Mixed => item(row, KanaScript::Hiragana),
                other => item(row, other),
            }
        })
        .collect()
}
