pub const SCHEMA: &str = r#"
-- keywords table
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('high', 'medium', 'low')),
    category TEXT,
    focus_score INTEGER NOT NULL DEFAULT 0 CHECK (focus_score BETWEEN 0 AND 100),
    notes TEXT,
    target_url TEXT,
    content_status TEXT NOT NULL DEFAULT 'not_started'
        CHECK (content_status IN ('not_started', 'planned', 'in_progress', 'published')),
    assigned_content_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_keywords_priority ON keywords(priority);
CREATE INDEX IF NOT EXISTS idx_keywords_category ON keywords(category);

-- seo_analyses table (latest analysis per keyword)
CREATE TABLE IF NOT EXISTS seo_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword_id INTEGER NOT NULL UNIQUE REFERENCES keywords(id) ON DELETE CASCADE,
    target_url TEXT NOT NULL,
    has_h1 INTEGER NOT NULL,
    h1_matches TEXT NOT NULL,
    has_meta_title INTEGER NOT NULL,
    meta_title TEXT,
    meta_title_match INTEGER NOT NULL,
    has_meta_description INTEGER NOT NULL,
    meta_description TEXT,
    meta_description_match INTEGER NOT NULL,
    keyword_density REAL NOT NULL,
    word_count INTEGER NOT NULL,
    keyword_count INTEGER NOT NULL,
    seo_score INTEGER NOT NULL,
    recommendations TEXT NOT NULL,
    analyzed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_seo_analyses_keyword_id ON seo_analyses(keyword_id);

-- gsc_tokens table (single row)
CREATE TABLE IF NOT EXISTS gsc_tokens (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    expires_at TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
