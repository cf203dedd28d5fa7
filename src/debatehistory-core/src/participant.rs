//! Historical figure definitions.
//!
//! The catalogue is immutable reference data compiled into the binary.
//! Sessions copy the figures they use so saved history stays readable even
//! if the catalogue changes later.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::DebateError;

/// Speaker id reserved for the human participant.
pub const USER_SPEAKER_ID: &str = "user";

/// Gender tag, used for voice selection and pronouns in prompts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// A historical figure who can sit at the table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalFigure {
    /// Stable key, also the speaker id the generator must use.
    pub id: String,
    pub name: String,
    /// Shorter name for transcript labels.
    pub short_name: String,
    pub gender: Gender,
    pub era: String,
    pub philosophy: String,
    /// Free-text personality description.
    pub description: String,
    pub avatar_url: String,
    #[serde(default)]
    pub quotes: Vec<String>,
    /// Titles the other speakers may use when addressing this figure.
    #[serde(default)]
    pub honorifics: Vec<String>,
}

impl HistoricalFigure {
    /// Name with era, for listings.
    pub fn display_name_with_era(&self) -> String {
        format!("{} ({})", self.name, self.era)
    }
}

struct FigureSeed {
    id: &'static str,
    name: &'static str,
    short_name: &'static str,
    gender: Gender,
    era: &'static str,
    philosophy: &'static str,
    description: &'static str,
    avatar_url: &'static str,
    quotes: &'static [&'static str],
    honorifics: &'static [&'static str],
}

impl From<&FigureSeed> for HistoricalFigure {
    fn from(seed: &FigureSeed) -> Self {
        Self {
            id: seed.id.to_string(),
            name: seed.name.to_string(),
            short_name: seed.short_name.to_string(),
            gender: seed.gender,
            era: seed.era.to_string(),
            philosophy: seed.philosophy.to_string(),
            description: seed.description.to_string(),
            avatar_url: seed.avatar_url.to_string(),
            quotes: seed.quotes.iter().map(|q| q.to_string()).collect(),
            honorifics: seed.honorifics.iter().map(|h| h.to_string()).collect(),
        }
    }
}

const SEEDS: &[FigureSeed] = &[
    FigureSeed {
        id: "ataturk",
        name: "Mustafa Kemal Atatürk",
        short_name: "Atatürk",
        gender: Gender::Male,
        era: "20th Century",
        philosophy: "Rationalism, Secularism, Progressivism",
        description: "Founder of modern Turkey, visionary statesman, emphasis on science, reason, and progress.",
        avatar_url: "https://cdn.britannica.com/56/195956-050-0110697A/Kemal-Ataturk.jpg",
        quotes: &[
            "The truest guide in life is science.",
            "Peace at home, peace in the world.",
        ],
        honorifics: &["Gazi", "Pasha", "Mr. President"],
    },
    FigureSeed {
        id: "socrates",
        name: "Socrates",
        short_name: "Socrates",
        gender: Gender::Male,
        era: "Ancient Greece",
        philosophy: "Socratic Method, Ethics, Epistemology",
        description: "Greek philosopher, founder of Western philosophy. Uses questioning to expose contradictions.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/a/a4/Socrates_Louvre.jpg/480px-Socrates_Louvre.jpg",
        quotes: &[
            "The unexamined life is not worth living.",
            "I know that I know nothing.",
        ],
        honorifics: &["Master", "Teacher"],
    },
    FigureSeed {
        id: "marx",
        name: "Karl Marx",
        short_name: "Marx",
        gender: Gender::Male,
        era: "19th Century",
        philosophy: "Historical Materialism, Socialism",
        description: "Philosopher, economist, historian. Analyzes society through class struggle and material conditions.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/d/d4/Karl_Marx_001.jpg/480px-Karl_Marx_001.jpg",
        quotes: &[
            "The philosophers have only interpreted the world; the point is to change it.",
            "Workers of the world, unite!",
        ],
        honorifics: &["Dr. Marx", "Comrade"],
    },
    FigureSeed {
        id: "curie",
        name: "Marie Curie",
        short_name: "Curie",
        gender: Gender::Female,
        era: "19th-20th Century",
        philosophy: "Scientific Realism, Humanism",
        description: "Physicist and chemist. Pioneer in radioactivity. Symbol of scientific dedication and discovery.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/7/7e/Marie_Curie_c1920.jpg/433px-Marie_Curie_c1920.jpg",
        quotes: &[
            "Nothing in life is to be feared, it is only to be understood.",
            "Be less curious about people and more curious about ideas.",
        ],
        honorifics: &["Madame Curie", "Professor"],
    },
    FigureSeed {
        id: "machiavelli",
        name: "Niccolò Machiavelli",
        short_name: "Machiavelli",
        gender: Gender::Male,
        era: "Renaissance",
        philosophy: "Realism, Pragmatism",
        description: "Diplomat and philosopher. Focused on realpolitik, power dynamics, and the nature of leadership.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/e/e2/Portrait_of_Niccol%C3%B2_Machiavelli_by_Santi_di_Tito.jpg/480px-Portrait_of_Niccol%C3%B2_Machiavelli_by_Santi_di_Tito.jpg",
        quotes: &[
            "It is better to be feared than loved, if you cannot be both.",
            "Everyone sees what you appear to be, few experience what you really are.",
        ],
        honorifics: &["Messer Niccolò", "Secretary"],
    },
    FigureSeed {
        id: "confucius",
        name: "Confucius",
        short_name: "Confucius",
        gender: Gender::Male,
        era: "Ancient China",
        philosophy: "Virtue Ethics, Social Harmony",
        description: "Teacher and philosopher. Values ritual, filial duty, and the moral cultivation of rulers and citizens.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/1/1a/Confucius_Tang_Dynasty.jpg/480px-Confucius_Tang_Dynasty.jpg",
        quotes: &[
            "Real knowledge is to know the extent of one's ignorance.",
            "The man who moves a mountain begins by carrying away small stones.",
        ],
        honorifics: &["Master Kong", "Teacher"],
    },
    FigureSeed {
        id: "hypatia",
        name: "Hypatia of Alexandria",
        short_name: "Hypatia",
        gender: Gender::Female,
        era: "Late Antiquity",
        philosophy: "Neoplatonism, Mathematics",
        description: "Mathematician, astronomer and teacher. Calm, exacting, and devoted to reasoned inquiry.",
        avatar_url: "https://upload.wikimedia.org/wikipedia/commons/thumb/4/4d/Hypatia_portrait.png/480px-Hypatia_portrait.png",
        quotes: &[
            "Reserve your right to think, for even to think wrongly is better than not to think at all.",
        ],
        honorifics: &["Lady Hypatia", "Teacher"],
    },
];

static CATALOGUE: LazyLock<Vec<HistoricalFigure>> =
    LazyLock::new(|| SEEDS.iter().map(HistoricalFigure::from).collect());

/// All figures, in catalogue order.
pub fn catalogue() -> &'static [HistoricalFigure] {
    &CATALOGUE
}

/// Look up a figure by exact id.
pub fn find_figure(id: &str) -> Option<&'static HistoricalFigure> {
    CATALOGUE.iter().find(|f| f.id == id)
}

/// Resolve a list of ids, preserving order and failing on the first unknown id.
pub fn resolve_figures<S: AsRef<str>>(ids: &[S]) -> Result<Vec<HistoricalFigure>, DebateError> {
    ids.iter()
        .map(|id| {
            let id = id.as_ref();
            find_figure(id)
                .or_else(|| {
                    CATALOGUE
                        .iter()
                        .find(|f| f.id.eq_ignore_ascii_case(id) || f.short_name.eq_ignore_ascii_case(id))
                })
                .cloned()
                .ok_or_else(|| DebateError::UnknownParticipant(id.to_string()))
        })
        .collect()
}
