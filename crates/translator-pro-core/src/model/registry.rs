//! Language-pair to model resolution.

use crate::config::{Lang, LanguagePair};
use crate::error::{Error, Result};

/// Known translation directions and the pretrained model serving each.
const MODEL_TABLE: &[(Lang, Lang, &str)] = &[
    (Lang::Fr, Lang::En, "Helsinki-NLP/opus-mt-fr-en"),
    (Lang::En, Lang::Fr, "Helsinki-NLP/opus-mt-en-fr"),
    (Lang::Ar, Lang::En, "Helsinki-NLP/opus-mt-ar-en"),
    (Lang::En, Lang::Ar, "Helsinki-NLP/opus-mt-en-ar"),
    (Lang::Fr, Lang::Ar, "Helsinki-NLP/opus-mt-fr-ar"),
    (Lang::Ar, Lang::Fr, "Helsinki-NLP/opus-mt-ar-fr"),
    (Lang::Es, Lang::En, "Helsinki-NLP/opus-mt-es-en"),
    (Lang::En, Lang::Es, "Helsinki-NLP/opus-mt-en-es"),
    (Lang::De, Lang::En, "Helsinki-NLP/opus-mt-de-en"),
    (Lang::En, Lang::De, "Helsinki-NLP/opus-mt-en-de"),
    (Lang::It, Lang::En, "Helsinki-NLP/opus-mt-it-en"),
    (Lang::En, Lang::It, "Helsinki-NLP/opus-mt-en-it"),
];

/// Model identifier for a language pair.
pub fn resolve(pair: LanguagePair) -> Result<&'static str> {
    MODEL_TABLE
        .iter()
        .find(|(source, target, _)| *source == pair.source && *target == pair.target)
        .map(|(_, _, model_id)| *model_id)
        .ok_or(Error::UnsupportedPair { pair })
}

pub fn is_supported(pair: LanguagePair) -> bool {
    resolve(pair).is_ok()
}

/// Every pair with a known model, in table order
pub fn supported_pairs() -> impl Iterator<Item = LanguagePair> {
    MODEL_TABLE
        .iter()
        .map(|(source, target, _)| LanguagePair::new(*source, *target))
}
