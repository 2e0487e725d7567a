//! Shared fixtures for magpie integration tests.
//!
//! Each test gets an isolated data directory; fixture documents cover the
//! common shapes: a small OpenAPI service, a script registry, and a
//! workflow definition wired to the built-in tools.

use std::path::{Path, PathBuf};

use magpie_store::config::StoreConfig;
use tempfile::TempDir;

/// An isolated data directory. Keep the guard alive for the test's
/// duration; the directory is removed on drop.
pub struct TestDataDir {
    pub config: StoreConfig,
    _guard: TempDir,
}

impl TestDataDir {
    pub fn new() -> Self {
        let guard = tempfile::tempdir().expect("failed to create temp data dir");
        let config = StoreConfig::new(guard.path());
        Self {
            config,
            _guard: guard,
        }
    }

    pub fn path(&self) -> &Path {
        self.config.root()
    }

    /// Write a fixture file into the data dir and return its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture dir");
        }
        std::fs::write(&path, content).expect("failed to write fixture");
        path
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A small pet-service OpenAPI document covering every UI pattern:
/// paginated list, simple list, detail view, create form, edit form,
/// delete confirmation, and a file upload.
pub fn sample_openapi_yaml() -> &'static str {
    r##"openapi: "3.0.3"
info:
  title: Pet Service
  version: "1.0.0"
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - name: page
          in: query
          schema:
            type: integer
      responses:
        "200":
          description: a page of pets
          content:
            application/json:
              schema:
                type: array
                items:
                  $ref: "#/components/schemas/Pet"
    post:
      operationId: createPet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/NewPet"
      responses:
        "201":
          description: created
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
    get:
      operationId: getPet
      responses:
        "200":
          description: one pet
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Pet"
    put:
      operationId: updatePet
      requestBody:
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/NewPet"
      responses:
        "200":
          description: updated
    delete:
      operationId: deletePet
      responses:
        "204":
          description: deleted
  /pets/{petId}/photo:
    post:
      operationId: uploadPetPhoto
      requestBody:
        content:
          multipart/form-data:
            schema:
              type: object
              properties:
                caption:
                  type: string
                photo:
                  type: string
                  format: binary
      responses:
        "200":
          description: stored
  /tags:
    get:
      operationId: listTags
      responses:
        "200":
          description: every tag
          content:
            application/json:
              schema:
                type: array
                items:
                  type: string
components:
  schemas:
    Pet:
      type: object
      properties:
        id:
          type: integer
        name:
          type: string
    NewPet:
      type: object
      required: [name]
      properties:
        name:
          type: string
        tag:
          type: string
"##
}

/// A two-entry script registry: one clean entry and one with fixable
/// problems (bare id, bare path, no version).
pub fn sample_registry_json() -> String {
    serde_json::json!({
        "scripts": [
            {
                "id": "data/csv-parse",
                "name": "csv-parse",
                "category": "data",
                "path": "scripts/data/csv-parse.py",
                "description": "Parse CSV files into structured records",
                "version": "1.2.0",
                "execution": {
                    "type": "script",
                    "interpreter": "python3",
                    "args": [
                        {
                            "name": "input_file",
                            "type": "file",
                            "description": "CSV file to parse",
                            "required": true
                        }
                    ],
                    "timeout": 60
                },
                "outputs": [],
                "specialists": ["data-engineer"],
                "security": {
                    "sandbox": "minimal",
                    "max_memory": "512MB",
                    "network_access": false
                },
                "tags": ["csv", "data"]
            },
            {
                "id": "report-gen",
                "name": "report-gen",
                "category": "generation",
                "path": "generation/report-gen.py",
                "description": "Generate summary reports",
                "execution": {
                    "type": "script",
                    "interpreter": "python3",
                    "args": []
                },
                "specialists": ["data-engineer", "reporter"]
            }
        ]
    })
    .to_string()
}

/// A workflow that classifies an OpenAPI document and logs the result.
/// `{spec}` is replaced with the given path.
pub fn sample_workflow_yaml(spec: &Path) -> String {
    format!(
        r#"id: classify-and-report
steps:
  - type: task
    id: classify
    tool: classify_endpoints
    parameters:
      spec: "{spec}"
    output_mapping:
      - source: count
        target: endpoint_count
        required: true
      - source: endpoints
        target: endpoints
  - type: conditional
    condition:
      greater: ["$endpoint_count", 0]
    then:
      - type: task
        id: report
        tool: log
        depends_on: [classify]
        parameters:
          message: "classified ${{endpoint_count}} endpoints"
"#,
        spec = spec.display()
    )
}
