//! Heuristic deciding whether a PDF's native text layer is usable.
//!
//! Scanned PDFs either carry no text layer at all (extraction returns a few
//! stray characters) or a spurious one full of control characters and ligature
//! garbage. Both cases are routed to the OCR fallback; slide-deck text is
//! structured rather than rendered and is trusted unconditionally.

/// Minimum character count for extraction output to count as body text.
const MIN_TEXT_CHARS: usize = 100;

/// Minimum ratio of ASCII alphabetic characters to total characters.
/// A ratio of exactly 0.5 passes; only strictly lower ratios are rejected.
const MIN_ALPHABETIC_RATIO: f64 = 0.5;

/// Returns true when native PDF extraction output is usable as-is.
///
/// Two-tier decision: either the text is accepted verbatim or the document is
/// re-extracted via OCR. There is no partial merge of native and OCR text.
pub fn is_valid_text(text: &str) -> bool {
    let total = text.chars().count();
    if total < MIN_TEXT_CHARS {
        return false;
    }

    let alphabetic = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let ratio = alphabetic as f64 / total as f64;

    ratio >= MIN_ALPHABETIC_RATIO
}
