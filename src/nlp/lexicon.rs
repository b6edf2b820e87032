use crate::model::Intensity;

/// A canonical flavor with the surface forms that resolve to it.
#[derive(Debug, Clone, Copy)]
pub struct FlavorGroup {
    pub term: &'static str,
    pub category: &'static str,
    pub synonyms: &'static [&'static str],
}

pub const FLAVOR_GROUPS: &[FlavorGroup] = &[
    FlavorGroup { term: "chocolate", category: "chocolate", synonyms: &["chocolatey", "cocoa"] },
    FlavorGroup { term: "blueberry", category: "fruit", synonyms: &[] },
    FlavorGroup { term: "berry", category: "fruit", synonyms: &["berries"] },
    FlavorGroup { term: "caramel", category: "sweet", synonyms: &["toffee"] },
    FlavorGroup { term: "citrus", category: "fruit", synonyms: &[] },
    FlavorGroup { term: "lemon", category: "fruit", synonyms: &[] },
    FlavorGroup { term: "orange", category: "fruit", synonyms: &[] },
    FlavorGroup { term: "lime", category: "fruit", synonyms: &[] },
    FlavorGroup { term: "floral", category: "floral", synonyms: &[] },
    FlavorGroup { term: "jasmine", category: "floral", synonyms: &[] },
    FlavorGroup { term: "rose", category: "floral", synonyms: &[] },
    FlavorGroup { term: "nutty", category: "nutty", synonyms: &[] },
    FlavorGroup { term: "almond", category: "nutty", synonyms: &[] },
    FlavorGroup { term: "hazelnut", category: "nutty", synonyms: &[] },
    FlavorGroup { term: "walnut", category: "nutty", synonyms: &[] },
    FlavorGroup { term: "earthy", category: "earthy", synonyms: &["woody"] },
    FlavorGroup { term: "fruity", category: "fruit", synonyms: &["fruit"] },
    FlavorGroup { term: "bright", category: "acidity", synonyms: &["vibrant"] },
    FlavorGroup { term: "acidic", category: "acidity", synonyms: &["acidity"] },
    FlavorGroup { term: "bitter", category: "bitter", synonyms: &["bitterness"] },
    FlavorGroup { term: "sweet", category: "sweet", synonyms: &["sweetness"] },
];

/// Every surface form the flavor extractor searches for, in lexicon order.
pub fn flavor_keywords() -> Vec<&'static str> {
    FLAVOR_GROUPS
        .iter()
        .flat_map(|group| std::iter::once(group.term).chain(group.synonyms.iter().copied()))
        .collect()
}

/// Checked in order; a later level with a marker in the sentence overrides an earlier one.
pub const INTENSITY_MARKERS: &[(Intensity, &[&str])] = &[
    (
        Intensity::Prominent,
        &["strong", "intense", "heavy", "prominent", "dominant", "bold"],
    ),
    (
        Intensity::Moderate,
        &["moderate", "balanced", "medium", "noticeable"],
    ),
    (
        Intensity::Subtle,
        &["subtle", "light", "hint", "touch", "slight", "delicate"],
    ),
];

pub const BREW_METHODS: &[&str] = &[
    "pour over",
    "v60",
    "aeropress",
    "espresso",
    "french press",
    "cold brew",
    "drip",
    "chemex",
    "espresso machine",
    "moka pot",
    "siphon",
];

/// (surface form, canonical process)
pub const PROCESS_METHODS: &[(&str, &str)] = &[
    ("washed", "washed"),
    ("fully washed", "washed"),
    ("natural process", "natural"),
    ("naturally processed", "natural"),
    ("dry processed", "natural"),
    ("honey process", "honey"),
    ("honey processed", "honey"),
    ("anaerobic", "anaerobic"),
    ("wet hulled", "wet hulled"),
    ("wet-hulled", "wet hulled"),
    ("carbonic maceration", "carbonic maceration"),
];

pub const KNOWN_ROASTERS: &[&str] = &[
    "blue bottle",
    "onyx",
    "counter culture",
    "stumptown",
    "intelligentsia",
    "verve",
    "heart",
    "coava",
    "klatch",
    "ritual",
    "sight glass",
    "george howell",
];

/// (surface form, canonical country)
pub const ORIGIN_TERMS: &[(&str, &str)] = &[
    ("ethiopia", "Ethiopia"),
    ("ethiopian", "Ethiopia"),
    ("kenya", "Kenya"),
    ("kenyan", "Kenya"),
    ("colombia", "Colombia"),
    ("colombian", "Colombia"),
    ("brazil", "Brazil"),
    ("brazilian", "Brazil"),
    ("guatemala", "Guatemala"),
    ("guatemalan", "Guatemala"),
    ("costa rica", "Costa Rica"),
    ("costa rican", "Costa Rica"),
    ("rwanda", "Rwanda"),
    ("rwandan", "Rwanda"),
    ("burundi", "Burundi"),
    ("burundian", "Burundi"),
    ("yemen", "Yemen"),
    ("yemeni", "Yemen"),
    ("tanzania", "Tanzania"),
    ("tanzanian", "Tanzania"),
    ("peru", "Peru"),
    ("peruvian", "Peru"),
    ("honduras", "Honduras"),
    ("honduran", "Honduras"),
];

pub const DRINK_KEYWORDS: &[&str] = &[
    "latte",
    "cappuccino",
    "americano",
    "espresso",
    "mocha",
    "macchiato",
    "cortado",
    "flat white",
    "cold brew",
    "iced coffee",
    "frappuccino",
    "frappe",
    "nitro",
    "pour over",
    "drip coffee",
    "caramel",
    "vanilla",
    "hazelnut",
    "pumpkin spice",
    "peppermint",
    "blonde",
    "dark roast",
    "medium roast",
    "decaf",
];

pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "around", "as", "at", "be", "because", "been", "before", "being", "below", "best",
    "better", "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing",
    "done", "down", "during", "each", "even", "ever", "every", "few", "for", "from", "further",
    "get", "gets", "getting", "going", "good", "got", "great", "had", "has", "have", "having",
    "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "i", "if",
    "in", "into", "is", "it", "its", "itself", "just", "know", "like", "made", "make", "makes",
    "many", "me", "might", "more", "most", "much", "must", "my", "myself", "need", "never", "new",
    "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only", "or", "other", "our",
    "ours", "ourselves", "out", "over", "own", "pretty", "quite", "really", "same", "say", "see",
    "she", "should", "so", "some", "something", "still", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "thing", "things", "think",
    "this", "those", "though", "through", "to", "too", "try", "tried", "under", "until", "up",
    "us", "use", "used", "using", "very", "want", "was", "way", "we", "well", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "yet",
    "you", "your", "yours", "yourself", "yourselves", "don't", "i'm", "it's", "i've", "can't",
    "didn't", "doesn't", "isn't", "wasn't", "won't", "that's", "there's", "you're",
];

/// Polarity in [-1, 1] for sentiment-bearing words.
pub const SENTIMENT_WORDS: &[(&str, f64)] = &[
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("bad", -0.7),
    ("balanced", 0.3),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("better", 0.5),
    ("bland", -0.5),
    ("boring", -0.5),
    ("burnt", -0.6),
    ("clean", 0.37),
    ("complex", 0.3),
    ("delicious", 1.0),
    ("disappointing", -0.6),
    ("enjoy", 0.4),
    ("enjoyed", 0.4),
    ("excellent", 1.0),
    ("fantastic", 0.4),
    ("favorite", 0.5),
    ("fine", 0.42),
    ("flat", -0.25),
    ("fresh", 0.3),
    ("gross", -0.8),
    ("good", 0.7),
    ("great", 0.8),
    ("harsh", -0.4),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("incredible", 0.9),
    ("like", 0.2),
    ("love", 0.5),
    ("loved", 0.7),
    ("meh", -0.3),
    ("mediocre", -0.4),
    ("nice", 0.6),
    ("overpriced", -0.5),
    ("perfect", 1.0),
    ("pleasant", 0.73),
    ("poor", -0.4),
    ("rich", 0.375),
    ("smooth", 0.4),
    ("sour", -0.3),
    ("stale", -0.5),
    ("terrible", -1.0),
    ("watery", -0.4),
    ("weak", -0.375),
    ("wonderful", 1.0),
    ("worse", -0.4),
    ("worst", -1.0),
];

/// Multipliers applied to the next sentiment word.
pub const INTENSIFIERS: &[(&str, f64)] = &[
    ("extremely", 1.5),
    ("incredibly", 1.4),
    ("really", 1.3),
    ("very", 1.3),
    ("super", 1.3),
    ("so", 1.2),
    ("quite", 1.1),
    ("somewhat", 0.7),
    ("slightly", 0.5),
    ("bit", 0.6),
];

pub const NEGATIONS: &[&str] = &[
    "not", "no", "never", "hardly", "isn't", "wasn't", "don't", "doesn't", "didn't", "aren't",
    "can't", "won't", "nothing",
];
