//! Recipe descriptor catalog: the built-in list, JSON loading and validation.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::CatalogError;
use crate::types::RecipeDescriptor;

/// Slug reserved for the metadata block of checkpoint files.
pub const RESERVED_SLUG: &str = "metadata";

/// The built-in gluten-free recipe catalog, in processing order.
pub fn builtin_recipes() -> Vec<RecipeDescriptor> {
    [
        (
            "Fluffy Almond Flour Pancakes",
            "almond-flour-pancakes",
            "Breakfast",
            "Light, golden pancakes made with almond flour and topped with fresh berries and maple syrup",
        ),
        (
            "Overnight Chia Oats",
            "overnight-chia-oats",
            "Breakfast",
            "Certified gluten-free oats soaked overnight with chia seeds, almond milk and sliced banana",
        ),
        (
            "Sweet Potato Breakfast Hash",
            "sweet-potato-hash",
            "Breakfast",
            "Crispy cubes of sweet potato with peppers, onions and two sunny-side-up eggs in a cast iron skillet",
        ),
        (
            "Quinoa Tabbouleh Salad",
            "quinoa-tabbouleh",
            "Lunch",
            "Fresh parsley, mint, cucumber and tomato tossed with fluffy quinoa and lemon dressing",
        ),
        (
            "Thai Peanut Rice Noodle Bowl",
            "thai-peanut-noodles",
            "Lunch",
            "Rice noodles in a tamari peanut sauce with shredded carrots, cabbage and crushed peanuts",
        ),
        (
            "Chicken Lettuce Wraps",
            "chicken-lettuce-wraps",
            "Lunch",
            "Savory ground chicken with water chestnuts and ginger served in crisp butter lettuce cups",
        ),
        (
            "Lemon Herb Roasted Salmon",
            "lemon-herb-salmon",
            "Dinner",
            "Oven-roasted salmon fillet with lemon slices, dill and roasted asparagus on a sheet pan",
        ),
        (
            "Creamy Mushroom Risotto",
            "mushroom-risotto",
            "Dinner",
            "Arborio rice slowly cooked with mixed mushrooms, parmesan and fresh thyme",
        ),
        (
            "Beef and Broccoli Stir-Fry",
            "beef-broccoli-stir-fry",
            "Dinner",
            "Tender strips of flank steak with broccoli florets in a glossy tamari ginger sauce over jasmine rice",
        ),
        (
            "Stuffed Bell Peppers",
            "stuffed-bell-peppers",
            "Dinner",
            "Colorful bell peppers filled with seasoned ground turkey, rice, black beans and melted cheese",
        ),
        (
            "Flourless Chocolate Cake",
            "flourless-chocolate-cake",
            "Dessert",
            "Dense, fudgy chocolate cake dusted with cocoa powder and served with whipped cream",
        ),
        (
            "Coconut Macaroons",
            "coconut-macaroons",
            "Dessert",
            "Chewy coconut macaroons with golden edges, half dipped in dark chocolate",
        ),
        (
            "Crispy Baked Zucchini Fries",
            "zucchini-fries",
            "Snacks",
            "Zucchini sticks coated in almond meal and parmesan, baked until crisp, with marinara for dipping",
        ),
        (
            "Rosemary Sea Salt Crackers",
            "rosemary-crackers",
            "Snacks",
            "Thin seed and nut crackers flecked with rosemary and flaky sea salt",
        ),
        (
            "Gluten-Free Sandwich Bread",
            "sandwich-bread",
            "Baking",
            "A tall, soft loaf with a golden crust made from a brown rice and tapioca flour blend",
        ),
        (
            "Banana Walnut Muffins",
            "banana-walnut-muffins",
            "Baking",
            "Moist banana muffins made with oat flour and studded with toasted walnuts",
        ),
    ]
    .into_iter()
    .map(|(title, slug, category, description)| {
        RecipeDescriptor::new(title, slug, category, description)
    })
    .collect()
}

/// Load recipe descriptors from a JSON file containing an array of descriptors.
///
/// The loaded list is validated before it is returned.
pub fn load_recipes(path: &Path) -> Result<Vec<RecipeDescriptor>, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let recipes: Vec<RecipeDescriptor> =
        serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    validate_recipes(&recipes)?;
    Ok(recipes)
}

/// Check that every slug is non-empty, URL-safe, not reserved and unique.
pub fn validate_recipes(recipes: &[RecipeDescriptor]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();

    for recipe in recipes {
        validate_slug(&recipe.slug)?;
        if !seen.insert(recipe.slug.as_str()) {
            return Err(CatalogError::DuplicateSlug(recipe.slug.clone()));
        }
    }

    Ok(())
}

fn validate_slug(slug: &str) -> Result<(), CatalogError> {
    let invalid = |reason| CatalogError::InvalidSlug {
        slug: slug.to_string(),
        reason,
    };

    if slug.is_empty() {
        return Err(invalid("slug is empty"));
    }
    if slug == RESERVED_SLUG {
        return Err(invalid("slug is reserved for checkpoint metadata"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("only lowercase letters, digits and '-' are allowed"));
    }

    Ok(())
}

/// Keep only recipes in the given category (case-insensitive).
pub fn filter_by_category(recipes: Vec<RecipeDescriptor>, category: &str) -> Vec<RecipeDescriptor> {
    recipes
        .into_iter()
        .filter(|r| r.category.eq_ignore_ascii_case(category))
        .collect()
}
