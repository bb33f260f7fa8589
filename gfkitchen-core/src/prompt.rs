//! Prompt composition for recipe photos.

use crate::types::RecipeDescriptor;

/// Stylistic suffix appended to every image prompt.
pub const STYLE_SUFFIX: &str = "Professional food photography, appetizing presentation, \
natural window lighting, shallow depth of field, high resolution, no text or watermarks";

/// Build the image-generation prompt for a recipe.
pub fn compose_prompt(recipe: &RecipeDescriptor) -> String {
    let description = recipe.description.trim().trim_end_matches('.');
    let category = recipe.category.trim().to_lowercase();

    if description.is_empty() {
        format!(
            "{}, a gluten-free {} dish. {}.",
            recipe.title.trim(),
            category,
            STYLE_SUFFIX
        )
    } else {
        format!(
            "{}, a gluten-free {} dish. {}. {}.",
            recipe.title.trim(),
            category,
            description,
            STYLE_SUFFIX
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_title_category_description_and_style() {
        let recipe = RecipeDescriptor::new(
            "Coconut Macaroons",
            "coconut-macaroons",
            "Dessert",
            "Chewy and golden.",
        );

        let prompt = compose_prompt(&recipe);
        assert_eq!(
            prompt,
            format!(
                "Coconut Macaroons, a gluten-free dessert dish. Chewy and golden. {}.",
                STYLE_SUFFIX
            )
        );
    }

    #[test]
    fn empty_description_is_omitted() {
        let recipe = RecipeDescriptor::new("Toast", "toast", "Breakfast", "  ");
        let prompt = compose_prompt(&recipe);
        assert!(prompt.starts_with("Toast, a gluten-free breakfast dish. Professional"));
    }
}
