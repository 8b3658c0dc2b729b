//! Keyword-table query classification
//!
//! Labels a user message with a topic, a complexity level, and whether the
//! user asked for code. Everything is table lookups over the lower-cased
//! message; there is no model call and no failure path.
//!
//! Topics are checked in table order and the **first** topic with any matching
//! keyword wins. Keywords match whole words or whole phrases: the message is
//! split on non-alphanumeric characters before lookup, so `ai` matches
//! "What is AI?" but not "explain".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Topic bucket for a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Architecture,
    Algorithms,
    DesignPatterns,
    SystemDesign,
    AiMl,
    Devops,
    WebDev,
    BestPractices,
    General,
}

impl TopicCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCategory::Architecture => "architecture",
            TopicCategory::Algorithms => "algorithms",
            TopicCategory::DesignPatterns => "design_patterns",
            TopicCategory::SystemDesign => "system_design",
            TopicCategory::AiMl => "ai_ml",
            TopicCategory::Devops => "devops",
            TopicCategory::WebDev => "web_dev",
            TopicCategory::BestPractices => "best_practices",
            TopicCategory::General => "general",
        }
    }

    /// What the answer should concentrate on for this topic
    pub fn focus(&self) -> &'static str {
        match self {
            TopicCategory::Architecture => {
                "software architecture: component boundaries, layering, and the trade-offs between architectural styles"
            }
            TopicCategory::Algorithms => {
                "algorithms and data structures: correctness, time and space complexity, and when to choose each approach"
            }
            TopicCategory::DesignPatterns => {
                "design patterns: the problem each pattern solves, its structure, and when it is overkill"
            }
            TopicCategory::SystemDesign => {
                "system design: scalability, availability, data partitioning, and capacity estimates"
            }
            TopicCategory::AiMl => {
                "AI and machine learning: core concepts, model behaviour, and practical limitations"
            }
            TopicCategory::Devops => {
                "DevOps: build and deployment pipelines, containers, infrastructure as code, and operability"
            }
            TopicCategory::WebDev => {
                "web development: HTTP, APIs, frontend and backend frameworks, and browser behaviour"
            }
            TopicCategory::BestPractices => {
                "engineering best practices: readability, testing, code review, and maintainability"
            }
            TopicCategory::General => "general software engineering questions",
        }
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How deep the answer should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Beginner => "beginner",
            ComplexityLevel::Intermediate => "intermediate",
            ComplexityLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: TopicCategory,
    pub complexity: ComplexityLevel,
    pub include_code: bool,
}

/// Topic table, evaluated top to bottom.
const TOPIC_RULES: &[(TopicCategory, &[&str])] = &[
    (
        TopicCategory::Architecture,
        &[
            "architecture",
            "architectural",
            "microservice",
            "microservices",
            "monolith",
            "monolithic",
            "hexagonal",
            "layered architecture",
            "clean architecture",
            "event driven",
            "serverless",
        ],
    ),
    (
        TopicCategory::Algorithms,
        &[
            "algorithm",
            "algorithms",
            "data structure",
            "data structures",
            "linked list",
            "binary search",
            "sorting",
            "quicksort",
            "merge sort",
            "recursion",
            "dynamic programming",
            "big o",
            "hash table",
            "hash map",
            "binary tree",
            "graph traversal",
            "bfs",
            "dfs",
        ],
    ),
    (
        TopicCategory::DesignPatterns,
        &[
            "design pattern",
            "design patterns",
            "singleton",
            "factory",
            "observer",
            "decorator",
            "strategy pattern",
            "adapter pattern",
            "builder pattern",
            "dependency injection",
            "solid",
        ],
    ),
    (
        TopicCategory::SystemDesign,
        &[
            "system design",
            "scalability",
            "scalable",
            "load balancer",
            "load balancing",
            "sharding",
            "replication",
            "distributed",
            "high availability",
            "rate limiter",
            "cap theorem",
            "caching",
        ],
    ),
    (
        TopicCategory::AiMl,
        &[
            "ai",
            "artificial intelligence",
            "machine learning",
            "ml",
            "deep learning",
            "neural network",
            "neural networks",
            "llm",
            "llms",
            "nlp",
            "transformer",
            "gpt",
            "embedding",
            "embeddings",
            "rag",
        ],
    ),
    (
        TopicCategory::Devops,
        &[
            "devops",
            "docker",
            "kubernetes",
            "k8s",
            "ci cd",
            "pipeline",
            "terraform",
            "ansible",
            "deployment",
            "container",
            "containers",
            "helm",
            "jenkins",
            "github actions",
        ],
    ),
    (
        TopicCategory::WebDev,
        &[
            "web",
            "html",
            "css",
            "javascript",
            "typescript",
            "react",
            "vue",
            "angular",
            "frontend",
            "backend",
            "rest api",
            "http",
            "fastapi",
            "django",
        ],
    ),
    (
        TopicCategory::BestPractices,
        &[
            "best practice",
            "best practices",
            "clean code",
            "code review",
            "refactor",
            "refactoring",
            "unit test",
            "unit tests",
            "naming",
            "conventions",
            "maintainable",
            "readability",
        ],
    ),
];

const BEGINNER_KEYWORDS: &[&str] = &[
    "beginner",
    "simple terms",
    "simply",
    "basics",
    "basic",
    "introduction",
    "eli5",
    "explain like",
    "new to",
    "getting started",
    "easy",
];

const ADVANCED_KEYWORDS: &[&str] = &[
    "advanced",
    "in depth",
    "deep dive",
    "expert",
    "internals",
    "under the hood",
    "optimize",
    "optimization",
    "production grade",
    "trade offs",
    "tradeoffs",
];

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "example",
    "examples",
    "snippet",
    "implement",
    "implementation",
    "write",
    "show me",
    "sample",
    "program",
    "syntax",
];

/// Lower-cased message with every run of non-alphanumeric characters collapsed
/// to one space, padded with a space on both ends.
struct NormalizedText(String);

impl NormalizedText {
    fn new(message: &str) -> Self {
        let words = message
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self(format!(" {} ", words))
    }

    fn contains(&self, keyword: &str) -> bool {
        self.0.contains(&format!(" {} ", keyword))
    }

    fn any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.contains(k))
    }
}

/// Classify a message. Empty input yields `general` / `intermediate` / no code.
pub fn classify(message: &str) -> Classification {
    let text = NormalizedText::new(message);

    let topic = TOPIC_RULES
        .iter()
        .find(|(_, keywords)| text.any(keywords))
        .map(|(topic, _)| *topic)
        .unwrap_or(TopicCategory::General);

    let complexity = if text.any(BEGINNER_KEYWORDS) {
        ComplexityLevel::Beginner
    } else if text.any(ADVANCED_KEYWORDS) {
        ComplexityLevel::Advanced
    } else {
        ComplexityLevel::Intermediate
    };

    Classification {
        topic,
        complexity,
        include_code: text.any(CODE_KEYWORDS),
    }
}
