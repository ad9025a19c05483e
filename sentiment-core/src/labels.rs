use crate::types::Sentiment;

/// Maps raw model labels onto [`Sentiment`].
///
/// Understands binary `POSITIVE`/`NEGATIVE` labels and `"<N> star(s)"`
/// ratings. Anything else is reported as neutral and logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelNormalizer;

impl LabelNormalizer {
    pub fn normalize(&self, raw_label: &str, raw_score: f32) -> (Sentiment, f64) {
        let sentiment = self.sentiment_for(raw_label).unwrap_or_else(|| {
            tracing::warn!(label = raw_label, "unrecognised model label, reporting NEUTRAL");
            Sentiment::Neutral
        });
        (sentiment, round_confidence(raw_score))
    }

    /// Strict variant of [`normalize`](Self::normalize): `None` for unknown shapes.
    pub fn sentiment_for(&self, raw_label: &str) -> Option<Sentiment> {
        let label = raw_label.trim().to_ascii_uppercase();
        match label.as_str() {
            "POSITIVE" => return Some(Sentiment::Positive),
            "NEGATIVE" => return Some(Sentiment::Negative),
            "NEUTRAL" => return Some(Sentiment::Neutral),
            _ => {}
        }

        let stars = parse_star_rating(&label)?;
        match stars {
            1 | 2 => Some(Sentiment::Negative),
            3 => Some(Sentiment::Neutral),
            4 | 5 => Some(Sentiment::Positive),
            _ => None,
        }
    }
}

/// `"4 STARS"` -> `Some(4)`; expects an upper-cased label.
fn parse_star_rating(label: &str) -> Option<u8> {
    let mut parts = label.split_whitespace();
    let count = parts.next()?.parse::<u8>().ok()?;
    match (parts.next(), parts.next()) {
        (Some("STAR" | "STARS"), None) => Some(count),
        _ => None,
    }
}

fn round_confidence(score: f32) -> f64 {
    let clamped = if score.is_finite() {
        f64::from(score).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (clamped * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_ratings_map_to_three_way_sentiment() {
        let normalizer = LabelNormalizer;
        let cases = [
            ("1 star", Sentiment::Negative),
            ("2 stars", Sentiment::Negative),
            ("3 stars", Sentiment::Neutral),
            ("4 stars", Sentiment::Positive),
            ("5 stars", Sentiment::Positive),
            ("5 STARS", Sentiment::Positive),
        ];
        for (label, expected) in cases {
            assert_eq!(normalizer.normalize(label, 0.5).0, expected, "{label}");
        }
    }

    #[test]
    fn binary_labels_pass_through_case_insensitively() {
        let normalizer = LabelNormalizer;
        assert_eq!(normalizer.normalize("POSITIVE", 0.9).0, Sentiment::Positive);
        assert_eq!(normalizer.normalize("negative", 0.9).0, Sentiment::Negative);
        assert_eq!(normalizer.normalize("Positive", 0.9).0, Sentiment::Positive);
    }

    #[test]
    fn unknown_labels_fall_back_to_neutral() {
        let normalizer = LabelNormalizer;
        for label in ["LABEL_0", "6 stars", "0 stars", "stars", "4 stars please", ""] {
            assert_eq!(normalizer.sentiment_for(label), None, "{label}");
            assert_eq!(normalizer.normalize(label, 0.7).0, Sentiment::Neutral);
        }
    }

    #[test]
    fn confidence_is_rounded_to_four_places() {
        let normalizer = LabelNormalizer;
        let (_, confidence) = normalizer.normalize("POSITIVE", 0.987_654_3);
        assert!((confidence - 0.9877).abs() < 1e-9);
        assert_eq!(normalizer.normalize("POSITIVE", 1.2).1, 1.0);
        assert_eq!(normalizer.normalize("POSITIVE", f32::NAN).1, 0.0);
    }
}
