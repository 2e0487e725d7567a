//! End-to-end: OpenAPI document in, UI patterns out.

use std::collections::BTreeMap;

use magpie_core::classify::{classify, UiPattern};
use magpie_core::openapi::Document;
use magpie_test_utils::{sample_openapi_yaml, TestDataDir};

fn patterns_by_operation() -> BTreeMap<String, UiPattern> {
    let document = Document::from_yaml(sample_openapi_yaml()).expect("fixture should parse");
    document
        .descriptors()
        .expect("derivation should succeed")
        .iter()
        .map(|d| {
            (
                d.operation_id.clone().expect("fixture names operations"),
                classify(d),
            )
        })
        .collect()
}

#[test]
fn sample_service_covers_every_pattern() {
    let patterns = patterns_by_operation();
    assert_eq!(patterns["listPets"], UiPattern::PaginatedList);
    assert_eq!(patterns["listTags"], UiPattern::SimpleList);
    assert_eq!(patterns["getPet"], UiPattern::DetailView);
    assert_eq!(patterns["createPet"], UiPattern::CreateForm);
    assert_eq!(patterns["updatePet"], UiPattern::EditForm);
    assert_eq!(patterns["deletePet"], UiPattern::DeleteConfirmation);
    assert_eq!(patterns["uploadPetPhoto"], UiPattern::FileUpload);
}

#[test]
fn classification_is_stable_across_loads() {
    assert_eq!(patterns_by_operation(), patterns_by_operation());
}

#[test]
fn loads_the_same_document_from_disk() {
    let data = TestDataDir::new();
    let path = data.write("api/pets.yaml", sample_openapi_yaml());
    let document = Document::load(&path).expect("file should load");
    assert_eq!(
        document.descriptors().expect("derivation").len(),
        patterns_by_operation().len()
    );
}
