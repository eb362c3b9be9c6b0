//! Known embedding models and how they expect to be prompted.
//!
//! Different model families differ only in data: which task prefixes they
//! were trained with and whether their output supports Matryoshka
//! truncation. The table is closed and static; [`lookup`] returns a
//! reference into it.

/// Prefix and normalization behavior of one model family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmbeddingProfile {
    /// Prefix for documents being indexed.
    pub document_prefix: &'static str,
    /// Prefix for retrieval queries.
    pub query_prefix: &'static str,
    /// Further task prefixes the model was trained with.
    pub other_prefixes: &'static [&'static str],
    /// Whether leading sub-vectors are independently meaningful.
    pub nested_capable: bool,
    /// Recommended truncated widths. Only set for nested-capable models.
    pub recommended_dimensions: Option<&'static [usize]>,
}

impl EmbeddingProfile {
    /// Whether `task` is a prefix this model recognizes.
    pub fn accepts_task(&self, task: &str) -> bool {
        task == self.document_prefix
            || task == self.query_prefix
            || self.other_prefixes.contains(&task)
    }

    /// Comma-separated recommended widths, for error messages.
    pub fn recommended_hint(&self) -> Option<String> {
        self.recommended_dimensions.map(|dims| {
            dims.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })
    }
}

const fn plain(document_prefix: &'static str, query_prefix: &'static str) -> EmbeddingProfile {
    EmbeddingProfile {
        document_prefix,
        query_prefix,
        other_prefixes: &[],
        nested_capable: false,
        recommended_dimensions: None,
    }
}

/// MiniLM sentence transformers: no prompting.
pub const NO_PREFIX: EmbeddingProfile = plain("", "");

/// Nomic v1 family.
pub const NOMIC: EmbeddingProfile = EmbeddingProfile {
    document_prefix: "search_document",
    query_prefix: "search_query",
    other_prefixes: &["clustering", "classification"],
    nested_capable: false,
    recommended_dimensions: None,
};

/// Nomic v1.5: same prompts as v1, Matryoshka-trained.
pub const NOMIC_V1_5: EmbeddingProfile = EmbeddingProfile {
    nested_capable: true,
    recommended_dimensions: Some(&[768, 512, 384, 256, 128]),
    ..NOMIC
};

/// BAAI llm-embedder.
pub const LLM_EMBEDDER: EmbeddingProfile = plain(
    "Represent this document for retrieval",
    "Represent this query for retrieving relevant documents",
);

/// BGE English models prompt queries only.
pub const BGE: EmbeddingProfile = plain("", "Represent this sentence for searching relevant passages");

/// E5 (v1, v2, unsupervised).
pub const E5: EmbeddingProfile = plain("passage", "query");

/// E5-Mistral and multilingual E5 instruct-style query prompt.
pub const E5_MISTRAL: EmbeddingProfile = plain(
    "",
    "Instruct: Given a query, retrieve relevant passages that answer the query\nQuery",
);

/// Every known model identifier, grouped by profile.
pub const PROFILE_TABLE: &[(&EmbeddingProfile, &[&str])] = &[
    (
        &NO_PREFIX,
        &["all-MiniLM-L6-v1", "all-MiniLM-L12-v1", "all-MiniLM-L6-v2", "all-MiniLM-L12-v2"],
    ),
    (
        &NOMIC,
        &["nomic-embed-text-v1", "nomic-embed-text-v1-ablated", "nomic-embed-text-v1-unsupervised"],
    ),
    (&NOMIC_V1_5, &["nomic-embed-text-v1.5"]),
    (&LLM_EMBEDDER, &["llm-embedder"]),
    (
        &BGE,
        &[
            "bge-small-en",
            "bge-base-en",
            "bge-large-en",
            "bge-small-en-v1.5",
            "bge-base-en-v1.5",
            "bge-large-en-v1.5",
        ],
    ),
    (
        &E5,
        &[
            "e5-small",
            "e5-base",
            "e5-large",
            "e5-small-unsupervised",
            "e5-base-unsupervised",
            "e5-large-unsupervised",
            "e5-small-v2",
            "e5-base-v2",
            "e5-large-v2",
        ],
    ),
    (
        &E5_MISTRAL,
        &[
            "e5-mistral-7b-instruct",
            "multilingual-e5-small",
            "multilingual-e5-base",
            "multilingual-e5-large",
            "multilingual-e5-large-instruct",
        ],
    ),
];

/// Profile for an exact model identifier, or `None` if unknown.
pub fn lookup(model: &str) -> Option<&'static EmbeddingProfile> {
    PROFILE_TABLE
        .iter()
        .find(|(_, names)| names.contains(&model))
        .map(|(profile, _)| *profile)
}
