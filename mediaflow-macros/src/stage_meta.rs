use darling::{FromAttributes, FromField};
use syn::{DeriveInput, Fields};

/// Parsed attributes from #[stage_meta(...)]
#[derive(Debug, FromAttributes)]
#[darling(attributes(stage_meta))]
pub struct StageMetaArgs {
    pub name: String,
    pub category: String,

    /// Registry key; defaults to the lowercased struct name
    #[darling(default)]
    pub kind: Option<String>,
}

/// Parsed attributes from #[param(...)]
#[derive(Debug, FromField)]
#[darling(attributes(param))]
pub struct ParamField {
    pub ident: Option<syn::Ident>,
    pub ty: syn::Type,

    #[darling(default)]
    pub default: Option<String>,

    #[darling(default)]
    pub min: Option<f64>,

    #[darling(default)]
    pub max: Option<f64>,
}

/// Parsed attributes from #[input(...)] / #[output(...)]
#[derive(Debug, FromField)]
#[darling(attributes(input, output))]
pub struct SlotField {
    pub ident: Option<syn::Ident>,

    #[darling(default)]
    pub name: Option<String>,

    #[darling(default)]
    pub media_type: Option<String>,
}

pub fn parse_stage_info(input: &DeriveInput) -> darling::Result<StageMetaArgs> {
    StageMetaArgs::from_attributes(&input.attrs)
}

fn named_fields(input: &DeriveInput) -> Option<&syn::punctuated::Punctuated<syn::Field, syn::token::Comma>> {
    match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Some(&fields.named),
            _ => None,
        },
        _ => None,
    }
}

pub fn parse_params(input: &DeriveInput) -> Vec<ParamField> {
    let Some(fields) = named_fields(input) else {
        return Vec::new();
    };

    fields
        .iter()
        .filter(|f| f.attrs.iter().any(|attr| attr.path().is_ident("param")))
        .filter_map(|f| ParamField::from_field(f).ok())
        .collect()
}

pub fn parse_slots(input: &DeriveInput) -> (Vec<SlotField>, Vec<SlotField>) {
    let Some(fields) = named_fields(input) else {
        return (Vec::new(), Vec::new());
    };

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for field in fields.iter() {
        if field.attrs.iter().any(|attr| attr.path().is_ident("input")) {
            if let Ok(slot) = SlotField::from_field(field) {
                inputs.push(slot);
            }
        }

        if field.attrs.iter().any(|attr| attr.path().is_ident("output")) {
            if let Ok(slot) = SlotField::from_field(field) {
                outputs.push(slot);
            }
        }
    }

    (inputs, outputs)
}
