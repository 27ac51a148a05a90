pub const SCHEMA: &str = r#"
-- Countries, cameras and lenses: photo dimensions with an "unknown" sentinel row
CREATE TABLE IF NOT EXISTS countries (
    id TEXT PRIMARY KEY,             -- ISO code, 'zz' for unknown
    country_slug TEXT NOT NULL UNIQUE,
    country_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cameras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    camera_slug TEXT NOT NULL UNIQUE,
    camera_make TEXT NOT NULL DEFAULT '',
    camera_model TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS lenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lens_slug TEXT NOT NULL UNIQUE,
    lens_make TEXT NOT NULL DEFAULT '',
    lens_model TEXT NOT NULL DEFAULT ''
);

INSERT OR IGNORE INTO countries (id, country_slug, country_name) VALUES ('zz', 'zz', 'Unknown');
INSERT OR IGNORE INTO cameras (id, camera_slug, camera_make, camera_model)
    VALUES (1, 'zz', '', 'Unknown');
INSERT OR IGNORE INTO lenses (id, lens_slug, lens_make, lens_model) VALUES (1, 'zz', '', 'Unknown');

-- Photos: logical library entries
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    camera_id INTEGER NOT NULL DEFAULT 1,
    lens_id INTEGER NOT NULL DEFAULT 1,
    photo_country TEXT NOT NULL DEFAULT 'zz',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_photos_camera ON photos(camera_id);
CREATE INDEX IF NOT EXISTS idx_photos_lens ON photos(lens_id);
CREATE INDEX IF NOT EXISTS idx_photos_country ON photos(photo_country);

-- Files: originals and sidecars belonging to a photo
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER,                -- NULL or dangling once the photo is gone
    file_name TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    file_missing INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_files_photo ON files(photo_id);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(file_hash);

-- Duplicates: known copies of indexed content
CREATE TABLE IF NOT EXISTS duplicates (
    file_name TEXT PRIMARY KEY,
    file_hash TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_duplicates_hash ON duplicates(file_hash);

-- Subjects: named people
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subj_slug TEXT NOT NULL UNIQUE,
    subj_name TEXT NOT NULL,
    subj_type TEXT NOT NULL DEFAULT 'person',
    subj_src TEXT NOT NULL DEFAULT 'manual',  -- 'manual' or 'marker'
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Faces: embedding clusters, one per visual identity
CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    face_src TEXT NOT NULL DEFAULT 'auto',   -- 'auto' or 'manual'
    subject_id INTEGER,
    embedding BLOB NOT NULL,                 -- float32 array stored as bytes
    embedding_dim INTEGER NOT NULL,
    samples INTEGER NOT NULL DEFAULT 1,
    collisions INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_faces_subject ON faces(subject_id);

-- Markers: detected face regions within files
CREATE TABLE IF NOT EXISTS markers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    marker_name TEXT NOT NULL DEFAULT '',    -- label typed by a user or read from metadata
    subject_id INTEGER,
    subj_src TEXT NOT NULL DEFAULT '',       -- 'manual', 'marker', 'auto' or ''
    face_id INTEGER,
    face_dist REAL NOT NULL DEFAULT -1,
    embedding BLOB,
    embedding_dim INTEGER,
    x REAL NOT NULL DEFAULT 0,
    y REAL NOT NULL DEFAULT 0,
    w REAL NOT NULL DEFAULT 0,
    h REAL NOT NULL DEFAULT 0,
    score INTEGER NOT NULL DEFAULT 0,
    marker_invalid INTEGER NOT NULL DEFAULT 0,
    clustered_at TEXT,
    matched_at TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_markers_file ON markers(file_id);
CREATE INDEX IF NOT EXISTS idx_markers_face ON markers(face_id);
CREATE INDEX IF NOT EXISTS idx_markers_subject ON markers(subject_id);
"#;
