//! Two-class multinomial naive Bayes over whitespace tokens, trained on a
//! small fixed seed corpus.

use std::collections::HashMap;

/// Probability assigned to a word never seen in a class.
const UNSEEN_WORD_PROB: f64 = 1e-11;

const PHISHING_SEED: &[&str] = &[
    "urgent action required verify your account immediately",
    "your account will be suspended within 24 hours",
    "click here to unlock your access",
    "unusual login attempt detected from new ip",
    "please update your billing information to avoid interruption",
    "confirm your identity securely",
    "dear customer we noticed suspicious activity",
    "security alert sign in to restore access",
];

const BENIGN_SEED: &[&str] = &[
    "thank you for your order your shipment is on the way",
    "meeting reminder for tomorrow at 10am",
    "weekly newsletter check out our new features",
    "your subscription has been renewed successfully",
    "happy birthday hoping you have a great day",
    "project update the timeline is looking good",
    "please review the attached document",
    "welcome to our service we are glad to have you",
];

#[derive(Debug, Clone, Default)]
struct ClassCounts {
    freqs: HashMap<String, u32>,
    total: u32,
}

impl ClassCounts {
    fn learn(&mut self, document: &str) {
        for word in document.split_whitespace() {
            *self.freqs.entry(word.to_string()).or_default() += 1;
            self.total += 1;
        }
    }

    fn word_prob(&self, word: &str) -> f64 {
        match self.freqs.get(word) {
            Some(&n) if self.total > 0 => f64::from(n) / f64::from(self.total),
            _ => UNSEEN_WORD_PROB,
        }
    }

    /// log P(class) + sum of log P(word | class).
    fn log_score(&self, prior: f64, tokens: &[String]) -> f64 {
        tokens
            .iter()
            .fold(prior.ln(), |acc, w| acc + self.word_prob(w).ln())
    }
}

#[derive(Debug, Clone)]
pub struct BayesClassifier {
    phishing: ClassCounts,
    benign: ClassCounts,
}

impl Default for BayesClassifier {
    fn default() -> Self {
        Self::seeded()
    }
}

impl BayesClassifier {
    /// Trained on the built-in seed corpus.
    pub fn seeded() -> Self {
        let mut phishing = ClassCounts::default();
        let mut benign = ClassCounts::default();
        for doc in PHISHING_SEED {
            phishing.learn(doc);
        }
        for doc in BENIGN_SEED {
            benign.learn(doc);
        }
        Self { phishing, benign }
    }

    /// Phishing log score minus benign log score. Priors are each class's
    /// share of all training words.
    pub fn log_likelihood_diff(&self, text: &str) -> f64 {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let all = f64::from(self.phishing.total + self.benign.total);
        if all == 0.0 {
            return 0.0;
        }
        let phishing_prior = f64::from(self.phishing.total) / all;
        let benign_prior = f64::from(self.benign.total) / all;
        self.phishing.log_score(phishing_prior, &tokens) - self.benign.log_score(benign_prior, &tokens)
    }

    /// Bucketed phishing confidence for `text`.
    pub fn confidence(&self, text: &str) -> f64 {
        confidence_from_diff(self.log_likelihood_diff(text))
    }
}

pub fn confidence_from_diff(diff: f64) -> f64 {
    if diff > 10.0 {
        0.99
    } else if diff > 5.0 {
        0.9
    } else if diff > 0.0 {
        0.75
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_match_thresholds() {
        assert_eq!(confidence_from_diff(10.5), 0.99);
        assert_eq!(confidence_from_diff(10.0), 0.9);
        assert_eq!(confidence_from_diff(5.0), 0.75);
        assert_eq!(confidence_from_diff(0.0), 0.1);
        assert_eq!(confidence_from_diff(-40.0), 0.1);
    }

    #[test]
    fn seed_phrases_classify_to_their_class() {
        let bayes = BayesClassifier::seeded();
        assert_eq!(bayes.confidence("urgent action required verify your account immediately"), 0.99);
        assert_eq!(bayes.confidence("Verify your account immediately or it will be suspended."), 0.99);
        assert_eq!(bayes.confidence("please review the attached document"), 0.1);
        assert_eq!(bayes.confidence("thank you for your order"), 0.1);
    }

    #[test]
    fn shared_words_land_in_middle_buckets() {
        let bayes = BayesClassifier::seeded();
        // "your" is 5/53 of phishing words and 3/60 of benign words.
        assert_eq!(bayes.confidence("your"), 0.75);
        assert_eq!(bayes.confidence(&["your"; 9].join(" ")), 0.9);
    }

    #[test]
    fn empty_text_falls_to_the_prior_and_is_benign() {
        let bayes = BayesClassifier::seeded();
        let diff = bayes.log_likelihood_diff("");
        assert!(diff < 0.0);
        assert!((diff - (53.0f64 / 60.0).ln()).abs() < 1e-12);
        assert_eq!(bayes.confidence(""), 0.1);
    }
}
