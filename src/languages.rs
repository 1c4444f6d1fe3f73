//! Transcription language table
//!
//! Static list of languages supported by the upstream transcription
//! service. This is configuration data, not logic; the front end uses it
//! to validate and display language choices.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One supported transcription language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

/// All languages accepted by the transcription service
pub static LANGUAGES: &[Language] = &[
    Language { code: "af", name: "Afrikaans" },
    Language { code: "am", name: "Amharic" },
    Language { code: "ar", name: "Arabic" },
    Language { code: "as", name: "Assamese" },
    Language { code: "az", name: "Azerbaijani" },
    Language { code: "ba", name: "Bashkir" },
    Language { code: "be", name: "Belarusian" },
    Language { code: "bg", name: "Bulgarian" },
    Language { code: "bn", name: "Bengali" },
    Language { code: "bo", name: "Tibetan" },
    Language { code: "br", name: "Breton" },
    Language { code: "bs", name: "Bosnian" },
    Language { code: "ca", name: "Catalan" },
    Language { code: "cs", name: "Czech" },
    Language { code: "cy", name: "Welsh" },
    Language { code: "da", name: "Danish" },
    Language { code: "de", name: "German" },
    Language { code: "el", name: "Greek" },
    Language { code: "en", name: "English" },
    Language { code: "es", name: "Spanish" },
    Language { code: "et", name: "Estonian" },
    Language { code: "eu", name: "Basque" },
    Language { code: "fa", name: "Persian" },
    Language { code: "fi", name: "Finnish" },
    Language { code: "fo", name: "Faroese" },
    Language { code: "fr", name: "French" },
    Language { code: "gl", name: "Galician" },
    Language { code: "gu", name: "Gujarati" },
    Language { code: "ha", name: "Hausa" },
    Language { code: "haw", name: "Hawaiian" },
    Language { code: "he", name: "Hebrew" },
    Language { code: "hi", name: "Hindi" },
    Language { code: "hr", name: "Croatian" },
    Language { code: "ht", name: "Haitian" },
    Language { code: "hu", name: "Hungarian" },
    Language { code: "hy", name: "Armenian" },
    Language { code: "id", name: "Indonesian" },
    Language { code: "is", name: "Icelandic" },
    Language { code: "it", name: "Italian" },
    Language { code: "ja", name: "Japanese" },
    Language { code: "jw", name: "Javanese" },
    Language { code: "ka", name: "Georgian" },
    Language { code: "kk", name: "Kazakh" },
    Language { code: "km", name: "Central Khmer" },
    Language { code: "kn", name: "Kannada" },
    Language { code: "ko", name: "Korean" },
    Language { code: "la", name: "Latin" },
    Language { code: "lb", name: "Luxembourgish" },
    Language { code: "ln", name: "Lingala" },
    Language { code: "lo", name: "Lao" },
    Language { code: "lt", name: "Lithuanian" },
    Language { code: "lv", name: "Latvian" },
    Language { code: "mg", name: "Malagasy" },
    Language { code: "mi", name: "Maori" },
    Language { code: "mk", name: "Macedonian" },
    Language { code: "ml", name: "Malayalam" },
    Language { code: "mn", name: "Mongolian" },
    Language { code: "mr", name: "Marathi" },
    Language { code: "ms", name: "Malay" },
    Language { code: "mt", name: "Maltese" },
    Language { code: "my", name: "Burmese" },
    Language { code: "ne", name: "Nepali" },
    Language { code: "nl", name: "Dutch" },
    Language { code: "nn", name: "Norwegian Nynorsk" },
    Language { code: "no", name: "Norwegian" },
    Language { code: "oc", name: "Occitan" },
    Language { code: "pa", name: "Panjabi" },
    Language { code: "pl", name: "Polish" },
    Language { code: "ps", name: "Pushto" },
    Language { code: "pt", name: "Portuguese" },
    Language { code: "ro", name: "Romanian" },
    Language { code: "ru", name: "Russian" },
    Language { code: "sa", name: "Sanskrit" },
    Language { code: "sd", name: "Sindhi" },
    Language { code: "si", name: "Sinhala" },
    Language { code: "sk", name: "Slovak" },
    Language { code: "sl", name: "Slovenian" },
    Language { code: "sn", name: "Shona" },
    Language { code: "so", name: "Somali" },
    Language { code: "sq", name: "Albanian" },
    Language { code: "sr", name: "Serbian" },
    Language { code: "su", name: "Sundanese" },
    Language { code: "sv", name: "Swedish" },
    Language { code: "sw", name: "Swahili" },
    Language { code: "ta", name: "Tamil" },
    Language { code: "te", name: "Telugu" },
    Language { code: "tg", name: "Tajik" },
    Language { code: "th", name: "Thai" },
    Language { code: "tk", name: "Turkmen" },
    Language { code: "tl", name: "Tagalog" },
    Language { code: "tr", name: "Turkish" },
    Language { code: "tt", name: "Tatar" },
    Language { code: "uk", name: "Ukrainian" },
    Language { code: "ur", name: "Urdu" },
    Language { code: "uz", name: "Uzbek" },
    Language { code: "vi", name: "Vietnamese" },
    Language { code: "yi", name: "Yiddish" },
    Language { code: "yo", name: "Yoruba" },
    Language { code: "yue", name: "Cantonese" },
    Language { code: "zh", name: "Chinese" },
];

static BY_CODE: Lazy<HashMap<&'static str, &'static Language>> =
    Lazy::new(|| LANGUAGES.iter().map(|l| (l.code, l)).collect());

/// Look up a language by code
pub fn find(code: &str) -> Option<&'static Language> {
    BY_CODE.get(code).copied()
}

/// Check whether a language code is supported
pub fn is_supported(code: &str) -> bool {
    BY_CODE.contains_key(code)
}
