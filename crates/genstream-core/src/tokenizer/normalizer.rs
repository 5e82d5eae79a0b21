//! Unicode normalizer for decoded pieces

use super::{vocab::WORD_BOUNDARY, Normalizer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationForm {
    Nfc,
    Nfkc,
}

/// Applies a Unicode normalization form and turns word-boundary markers back
/// into spaces.
#[derive(Debug, Clone)]
pub struct UnicodeNormalizer {
    form: NormalizationForm,
    replace_word_boundary: bool,
}

impl UnicodeNormalizer {
    pub fn new(form: NormalizationForm) -> Self {
        Self {
            form,
            replace_word_boundary: true,
        }
    }

    pub fn keep_word_boundary(mut self) -> Self {
        self.replace_word_boundary = false;
        self
    }
}

impl Default for UnicodeNormalizer {
    fn default() -> Self {
        Self::new(NormalizationForm::Nfkc)
    }
}

impl Normalizer for UnicodeNormalizer {
    fn normalize(&self, text: &str) -> String {
        let text = if self.replace_word_boundary {
            text.replace(WORD_BOUNDARY, " ")
        } else {
            text.to_string()
        };
        match self.form {
            NormalizationForm::Nfc => text.nfc().collect(),
            NormalizationForm::Nfkc => text.nfkc().collect(),
        }
    }
}
