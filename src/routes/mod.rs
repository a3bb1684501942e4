pub mod favourites;
pub mod forecasts;
pub mod health;
pub mod ingester;
