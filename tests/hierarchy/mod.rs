mod abort;
mod scenarios;
